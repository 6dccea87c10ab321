//! `SQLite`-backed store.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{KeyValueStore, Result, StoreError};
use crate::storage::{Entry, Storage, StorageStats};

/// Durable key-value store backed by `SQLite`.
///
/// Each call runs on tokio's blocking pool while holding the connection
/// lock, so the async caller is suspended rather than blocked.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    storage: Arc<Mutex<Storage>>,
}

impl SqliteStore {
    /// Open or create a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> crate::Result<Self> {
        Ok(Self::from_storage(Storage::open(path, busy_timeout)?))
    }

    /// Open an existing database for reading only.
    ///
    /// Writes through the returned store fail with [`StoreError::Write`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database does not exist or cannot be opened.
    pub fn open_read_only(path: impl AsRef<Path>, busy_timeout: Duration) -> crate::Result<Self> {
        Ok(Self::from_storage(Storage::open_read_only(path, busy_timeout)?))
    }

    /// Create a store backed by an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn open_in_memory() -> crate::Result<Self> {
        Ok(Self::from_storage(Storage::open_in_memory()?))
    }

    /// Wrap an already-open storage engine.
    #[must_use]
    pub fn from_storage(storage: Storage) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
        }
    }

    /// Get the full entry stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn entry(&self, key: &str) -> crate::Result<Option<Entry>> {
        let key = key.to_string();
        self.with_storage(move |storage| storage.entry(&key)).await
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn stats(&self) -> crate::Result<StorageStats> {
        self.with_storage(Storage::stats).await
    }

    async fn with_storage<T, F>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&Storage) -> crate::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || {
            let guard = storage.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await?
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let owned = key.to_string();
        self.with_storage(move |storage| storage.get(&owned))
            .await
            .map_err(|e| StoreError::read(key, e.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let owned_key = key.to_string();
        let owned_value = value.to_string();
        self.with_storage(move |storage| storage.set(&owned_key, &owned_value))
            .await
            .map_err(|e| StoreError::write(key, e.to_string()))
    }
}
