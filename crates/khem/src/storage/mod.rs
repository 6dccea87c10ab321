//! Storage layer for khem.
//!
//! This module provides `SQLite`-based persistent storage of string values
//! addressed by string keys. It is synchronous; the async store boundary in
//! [`crate::store`] drives it from blocking tasks.

pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default time `SQLite` waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Storage engine for key-value entries.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

/// A stored value together with the time it was last written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// The key the value is stored under.
    pub key: String,
    /// The stored value.
    pub value: String,
    /// When the value was last written.
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.busy_timeout(busy_timeout)?;
        // WAL keeps readers from blocking on the single writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        schema::initialize(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Open an existing database without writing to it.
    ///
    /// Unlike [`open`](Self::open) this never creates directories, the
    /// database file, or tables, and [`set`](Self::set) on the result fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DatabaseOpen`] if the file does not exist or cannot
    /// be opened, or a schema error if it was written by a newer build.
    pub fn open_read_only(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        debug!("Opening database read-only at {}", path.display());
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.busy_timeout(busy_timeout)?;
        schema::check_version(&conn)?;

        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        schema::initialize(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM entries WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Get the full entry stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn entry(&self, key: &str) -> Result<Option<Entry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT key, value, updated_at FROM entries WHERE key = ?1",
                [key],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        self.conn.execute(
            r"
            INSERT INTO entries (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value, updated_at],
        )?;
        debug!("Stored value for key {}", key);
        Ok(())
    }

    /// Count stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let total_entries = self.count()?;

        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM entries ORDER BY updated_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let last_updated = newest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_entries,
            last_updated,
            db_size_bytes,
        })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
        let key: String = row.get(0)?;
        let value: String = row.get(1)?;
        let updated_at_str: String = row.get(2)?;

        let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);

        Ok(Entry {
            key,
            value,
            updated_at,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Total number of entries stored.
    pub total_entries: i64,
    /// When any entry was last written.
    pub last_updated: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_open_in_memory() {
        let storage = create_test_storage();
        assert_eq!(storage.count().unwrap(), 0);
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_get_missing_key() {
        let storage = create_test_storage();
        assert!(storage.get("username").unwrap().is_none());
        assert!(storage.entry("username").unwrap().is_none());
    }

    #[test]
    fn test_set_and_get() {
        let storage = create_test_storage();
        storage.set("username", "Rami").unwrap();

        assert_eq!(storage.get("username").unwrap(), Some("Rami".to_string()));
        assert_eq!(storage.count().unwrap(), 1);
    }

    #[test]
    fn test_set_overwrites() {
        let storage = create_test_storage();
        storage.set("username", "Rami").unwrap();
        storage.set("username", "Khem Walker").unwrap();

        assert_eq!(
            storage.get("username").unwrap(),
            Some("Khem Walker".to_string())
        );
        assert_eq!(storage.count().unwrap(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let storage = create_test_storage();
        storage.set("username", "Rami").unwrap();
        storage.set("other", "value").unwrap();

        assert_eq!(storage.get("username").unwrap(), Some("Rami".to_string()));
        assert_eq!(storage.get("other").unwrap(), Some("value".to_string()));
        assert_eq!(storage.count().unwrap(), 2);
    }

    #[test]
    fn test_entry_has_timestamp() {
        let storage = create_test_storage();
        let before = Utc::now();
        storage.set("username", "Rami").unwrap();

        let entry = storage.entry("username").unwrap().unwrap();
        assert_eq!(entry.key, "username");
        assert_eq!(entry.value, "Rami");
        assert!(entry.updated_at >= before - chrono::Duration::seconds(1));
    }

    #[test]
    fn test_unicode_value() {
        let storage = create_test_storage();
        storage.set("username", "Ramsès ☀ 𓂀").unwrap();
        assert_eq!(
            storage.get("username").unwrap(),
            Some("Ramsès ☀ 𓂀".to_string())
        );
    }

    #[test]
    fn test_stats_empty() {
        let storage = create_test_storage();
        let stats = storage.stats().unwrap();

        assert_eq!(stats.total_entries, 0);
        assert!(stats.last_updated.is_none());
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_stats_with_data() {
        let storage = create_test_storage();
        storage.set("username", "Rami").unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_entries, 1);
        assert!(stats.last_updated.is_some());
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("khem.db");

        let storage = Storage::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert_eq!(storage.path(), path.as_path());
        assert!(path.exists());
    }

    #[test]
    fn test_open_read_only_missing_file_creates_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("khem.db");

        let err = Storage::open_read_only(&path, DEFAULT_BUSY_TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::DatabaseOpen { .. }));
        assert!(!path.exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn test_open_read_only_reads_but_rejects_writes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("khem.db");
        Storage::open(&path, DEFAULT_BUSY_TIMEOUT)
            .unwrap()
            .set("username", "Rami")
            .unwrap();

        let storage = Storage::open_read_only(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert_eq!(storage.get("username").unwrap(), Some("Rami".to_string()));
        assert_eq!(storage.stats().unwrap().total_entries, 1);
        assert!(storage.set("username", "Khem Walker").is_err());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("khem.db");

        {
            let storage = Storage::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
            storage.set("username", "Rami").unwrap();
        }

        let storage = Storage::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert_eq!(storage.get("username").unwrap(), Some("Rami".to_string()));
        assert!(storage.stats().unwrap().db_size_bytes > 0);
    }
}
