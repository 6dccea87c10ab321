//! `SQLite` schema for khem.
//!
//! The layout is versioned through a `schema_version` row in `metadata`.
//! Opening a database written by a newer build fails rather than guessing
//! at its layout.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Error, Result};

/// Layout version written by this build.
pub const SCHEMA_VERSION: i32 = 1;

const VERSION_KEY: &str = "schema_version";

/// One row per key; `updated_at` is RFC 3339 UTC.
pub const CREATE_ENTRIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// Lets `status` find the latest write without a scan.
pub const CREATE_UPDATED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_entries_updated ON entries(updated_at DESC)
";

/// Bookkeeping rows, currently only the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Creation statements, in execution order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ENTRIES_TABLE,
    CREATE_UPDATED_INDEX,
    CREATE_METADATA_TABLE,
];

/// Create any missing tables and stamp the schema version.
///
/// Safe to run on every open.
///
/// # Errors
///
/// Returns [`Error::UnsupportedSchema`] for a database from a newer build,
/// or a query error if a statement fails.
pub fn initialize(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let found = check_version(conn)?;
    if found < SCHEMA_VERSION {
        debug!("Stamping schema version {} (was {})", SCHEMA_VERSION, found);
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            (VERSION_KEY, SCHEMA_VERSION.to_string()),
        )?;
    }
    Ok(())
}

/// Read the recorded schema version and make sure this build understands it.
///
/// A database with no recorded version reports 0. Nothing is written, so
/// this works on read-only connections.
///
/// # Errors
///
/// Returns [`Error::UnsupportedSchema`] if the version is newer than
/// [`SCHEMA_VERSION`], [`Error::InvalidSchemaVersion`] if it is not a
/// number, or a query error if `metadata` cannot be read.
pub fn check_version(conn: &Connection) -> Result<i32> {
    let recorded: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    let found = match recorded {
        Some(value) => value
            .parse()
            .map_err(|_| Error::InvalidSchemaVersion(value))?,
        None => 0,
    };
    if found > SCHEMA_VERSION {
        return Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(found)
}
