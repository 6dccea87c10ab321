//! Asynchronous key-value store boundary.
//!
//! The identity flow only ever talks to a [`KeyValueStore`]. Two
//! implementations ship with the crate:
//!
//! - [`SqliteStore`] - durable storage backed by the `SQLite` engine in
//!   [`crate::storage`].
//! - [`MemoryStore`] - process-local storage with failure injection, used by
//!   tests and the `memory` backend.

pub mod memory;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::config::{Backend, Config};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors reported by a [`KeyValueStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The medium could not be read.
    #[error("failed to read key '{key}': {message}")]
    Read {
        /// Key being read.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The value could not be written durably.
    #[error("failed to write key '{key}': {message}")]
    Write {
        /// Key being written.
        key: String,
        /// Description of what went wrong.
        message: String,
    },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Create a read error for `key`.
    #[must_use]
    pub fn read(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Read {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a write error for `key`.
    #[must_use]
    pub fn write(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            key: key.into(),
            message: message.into(),
        }
    }

    /// The key the failed operation targeted.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Read { key, .. } | Self::Write { key, .. } => key,
        }
    }

    /// Check if this error came from a read.
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }

    /// Check if this error came from a write.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }
}

/// Durable string storage addressed by string keys.
///
/// Operations suspend the caller until the medium responds. Single-key
/// reads and writes are atomic; nothing is promised across keys.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Get the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key was never set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the medium is unreadable.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// Completes once the write is durable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] if the write fails.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Open the store selected by `config`.
///
/// # Errors
///
/// Returns an error if the `SQLite` database cannot be opened.
pub fn open_configured(config: &Config) -> crate::Result<Arc<dyn KeyValueStore>> {
    debug!("Opening {} store", config.storage.backend);
    match config.storage.backend {
        Backend::Sqlite => Ok(Arc::new(SqliteStore::open(
            config.database_path(),
            config.busy_timeout(),
        )?)),
        Backend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Open the configured store for a session that will not write.
///
/// Nothing is created on disk. A missing `SQLite` database means no name was
/// ever saved, so an empty [`MemoryStore`] stands in for it.
///
/// # Errors
///
/// Returns an error if an existing database cannot be opened.
pub fn open_configured_read_only(config: &Config) -> crate::Result<Arc<dyn KeyValueStore>> {
    match config.storage.backend {
        Backend::Sqlite => {
            let path = config.database_path();
            if path.exists() {
                debug!("Opening {} read-only", path.display());
                Ok(Arc::new(SqliteStore::open_read_only(
                    path,
                    config.busy_timeout(),
                )?))
            } else {
                debug!("No database at {}, nothing saved yet", path.display());
                Ok(Arc::new(MemoryStore::new()))
            }
        }
        Backend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
