//! Persistent match store.
//!
//! Backends implement [`MatchStore`]:
//! - [`JsonFileStore`]: one JSON document per player (ids, records, timestamp)
//! - [`JsonlRowStore`]: one JSONL row per (player, match), appended as upserts
//! - [`MemoryStore`]: in-process map, for tests and embedding

pub mod json_file;
pub mod jsonl;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CacheStats, PlayerCacheState, PlayerKey};

pub use json_file::JsonFileStore;
pub use jsonl::{JsonlReader, JsonlRowStore, JsonlWriter, MatchRow};
pub use memory::MemoryStore;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt cache for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable per-player cache storage.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Load a player's cache. A player with nothing stored yields an empty state.
    async fn load(&self, key: &PlayerKey) -> Result<PlayerCacheState, StoreError>;

    /// Persist a player's cache.
    async fn save(&self, key: &PlayerKey, state: &PlayerCacheState) -> Result<(), StoreError>;

    /// Remove everything stored for a player. Returns whether anything was removed.
    async fn clear(&self, key: &PlayerKey) -> Result<bool, StoreError>;

    async fn stats(&self, key: &PlayerKey) -> Result<CacheStats, StoreError> {
        Ok(self.load(key).await?.stats())
    }
}

/// Which persistent backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Jsonl,
    Memory,
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn matches_dir(&self) -> PathBuf {
        self.data_dir.join("matches")
    }

    pub fn rows_dir(&self) -> PathBuf {
        self.data_dir.join("rows")
    }

    /// `<data>/matches/<key>_match_data.json`
    pub fn match_data_path(&self, key: &PlayerKey) -> PathBuf {
        self.matches_dir()
            .join(format!("{}_match_data.json", file_stem(key)))
    }

    /// `<data>/rows/<key>.jsonl`
    pub fn match_rows_path(&self, key: &PlayerKey) -> PathBuf {
        self.rows_dir().join(format!("{}.jsonl", file_stem(key)))
    }

    /// `<data>/rows/<key>.meta.json`
    pub fn match_rows_meta_path(&self, key: &PlayerKey) -> PathBuf {
        self.rows_dir().join(format!("{}.meta.json", file_stem(key)))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}

/// Player keys are url-safe base64 upstream and pass through unchanged.
/// Any other byte is percent-encoded, so distinct keys stay distinct and a
/// key can never escape the data directory.
fn file_stem(key: &PlayerKey) -> String {
    let mut stem = String::with_capacity(key.as_str().len());
    for byte in key.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

/// Open the configured backend.
pub fn open_store(backend: StoreBackend, config: &StorageConfig) -> Arc<dyn MatchStore> {
    match backend {
        StoreBackend::Json => Arc::new(JsonFileStore::new(config.clone())),
        StoreBackend::Jsonl => Arc::new(JsonlRowStore::new(config.clone())),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    }
}
