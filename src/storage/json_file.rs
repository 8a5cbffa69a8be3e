//! Whole-document JSON store.
//!
//! Each player gets one pretty-printed document:
//!
//! ```json
//! { "matchIds": [..], "matchInfos": [..], "lastUpdated": "2025-06-01T12:00:00Z" }
//! ```
//!
//! Saves overwrite the whole document, so two writers for the same player
//! race and the last one wins.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{MatchStore, StorageConfig, StoreError};
use crate::models::{MatchId, MatchRecord, PlayerCacheState, PlayerKey};

/// On-disk layout of one player's cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDataDocument {
    pub match_ids: Vec<MatchId>,
    pub match_infos: Vec<MatchRecord>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl MatchDataDocument {
    fn from_state(state: &PlayerCacheState) -> Self {
        Self {
            match_ids: state.records().iter().map(|r| r.id().clone()).collect(),
            match_infos: state.records().to_vec(),
            last_updated: state.last_updated(),
        }
    }
}

/// File-per-player JSON store.
pub struct JsonFileStore {
    config: StorageConfig,
}

impl JsonFileStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    async fn read_document(path: &Path, key: &PlayerKey) -> Result<MatchDataDocument, StoreError> {
        let content = fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MatchStore for JsonFileStore {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn load(&self, key: &PlayerKey) -> Result<PlayerCacheState, StoreError> {
        let path = self.config.match_data_path(key);
        if !fs::try_exists(&path).await? {
            debug!("No cached match data for {}", key);
            return Ok(PlayerCacheState::empty());
        }

        let doc = Self::read_document(&path, key).await?;

        let listed: HashSet<&MatchId> = doc.match_ids.iter().collect();
        let stored: HashSet<&MatchId> = doc.match_infos.iter().map(|r| r.id()).collect();
        if listed != stored {
            warn!(
                "Match id list for {} disagrees with its records ({} ids, {} records); using records",
                key,
                listed.len(),
                stored.len()
            );
        }

        let state = PlayerCacheState::from_records(doc.match_infos, doc.last_updated);
        debug!("Loaded {} cached matches for {} from {:?}", state.len(), key, path);
        Ok(state)
    }

    async fn save(&self, key: &PlayerKey, state: &PlayerCacheState) -> Result<(), StoreError> {
        let path = self.config.match_data_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&MatchDataDocument::from_state(state))?;

        // Write beside the target, then rename over it.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;

        info!("Saved {} matches for {} to {:?}", state.len(), key, path);
        Ok(())
    }

    async fn clear(&self, key: &PlayerKey) -> Result<bool, StoreError> {
        let path = self.config.match_data_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Cleared cached matches for {}", key);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
