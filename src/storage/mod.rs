//! Durable key-value persistence
//!
//! The store itself only knows keys and JSON values. `RecordingLibrary`
//! layers the two capped recording collections, settings and credentials on
//! top and serializes every read-modify-write.

mod json_store;
mod library;

pub use json_store::JsonFileStore;
pub use library::{Collection, RecordingLibrary};

use std::path::PathBuf;
use thiserror::Error;

/// Synced recordings, most recent first
pub const RECORDINGS_KEY: &str = "recordings";
/// Local-only recordings pending sync, most recent first
pub const LOCAL_RECORDINGS_KEY: &str = "localRecordings";
pub const SETTINGS_KEY: &str = "settings";
pub const API_CONFIG_KEY: &str = "apiConfig";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored value for {key} is malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Minimal durable store contract
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
}
