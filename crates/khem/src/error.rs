//! Crate-level errors.
//!
//! Raised while opening the database, loading configuration, or running a
//! storage task. Failures of individual reads and writes at the key-value
//! boundary are reported as [`StoreError`](crate::store::StoreError) instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from opening storage and loading configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// The database file could not be opened.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Database file.
        path: PathBuf,
        /// Driver error.
        #[source]
        source: rusqlite::Error,
    },

    /// A statement against an open database failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// The database was written by a newer khem.
    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema {
        /// Version recorded in the database.
        found: i32,
        /// Highest version this build understands.
        supported: i32,
    },

    /// The recorded schema version is not a number.
    #[error("invalid schema version: {0:?}")]
    InvalidSchemaVersion(String),

    /// The directory holding the database could not be created.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Directory that was being created.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    StorageTask(#[from] tokio::task::JoinError),

    /// Configuration sources could not be merged or parsed.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration parsed but holds an unusable value.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// What is wrong with it.
        message: String,
    },
}

/// Result alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}
