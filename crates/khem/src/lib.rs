//! `khem` - persisted user identity for the Khem simulation
//!
//! This library loads a user name from a key-value store when a session
//! starts, keeps an edit buffer while the user types, and writes the name
//! back after validation.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod logging;
pub mod storage;
pub mod store;

pub use config::Config;
pub use controller::{IdentityController, Notification, Phase, SaveOutcome};
pub use error::{Error, Result};
pub use identity::{Identity, ValidationError, USERNAME_KEY};
pub use logging::init_logging;
pub use storage::{Storage, StorageStats};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, StoreError};
