//! JSONL (JSON Lines) row store.
//!
//! Each line is one (player, match) row. Saving only appends rows for match
//! ids the file does not already hold, so concurrent writers that fetched
//! different matches both keep their rows instead of overwriting each other.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{MatchStore, StorageConfig, StoreError};
use crate::models::{MatchId, MatchRecord, PlayerCacheState, PlayerKey};

/// JSONL file writer.
pub struct JsonlWriter<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize> JsonlWriter<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append entities to the file.
    pub fn append_batch(&self, entities: &[T]) -> Result<usize, StoreError> {
        if entities.is_empty() {
            return Ok(0);
        }

        self.ensure_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = BufWriter::new(file);
        for entity in entities {
            let json = serde_json::to_string(entity)?;
            writeln!(writer, "{}", json)?;
        }

        writer.flush()?;
        debug!("Appended {} rows to {:?}", entities.len(), self.path);

        Ok(entities.len())
    }
}

/// JSONL file reader.
pub struct JsonlReader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read all entities. Lines that fail to parse are skipped with a warning.
    pub fn read_all(&self) -> Result<Vec<T>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        let mut entities = Vec::new();
        let mut line = Vec::new();
        let mut idx = 0;

        // Byte lines, so a row that is not UTF-8 is skipped like any other bad row.
        while reader.read_until(b'\n', &mut line)? > 0 {
            idx += 1;
            if !line.iter().all(u8::is_ascii_whitespace) {
                match serde_json::from_slice(&line) {
                    Ok(entity) => entities.push(entity),
                    Err(e) => {
                        warn!("Failed to parse line {} in {:?}: {}", idx, self.path, e);
                    }
                }
            }
            line.clear();
        }

        debug!("Read {} rows from {:?}", entities.len(), self.path);
        Ok(entities)
    }
}

/// One stored (player, match) row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRow {
    pub player_key: PlayerKey,
    pub match_id: MatchId,
    /// Copied out of the detail so rows can be ordered without parsing it.
    pub game_creation: i64,
    pub detail: MatchRecord,
}

impl MatchRow {
    fn new(player_key: &PlayerKey, record: &MatchRecord) -> Self {
        Self {
            player_key: player_key.clone(),
            match_id: record.id().clone(),
            game_creation: record.game_creation(),
            detail: record.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RowsMeta {
    last_updated: Option<DateTime<Utc>>,
}

/// Row-per-match store with append-only upserts.
///
/// File access is synchronous and runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct JsonlRowStore {
    config: StorageConfig,
}

impl JsonlRowStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    fn read_meta(&self, key: &PlayerKey) -> RowsMeta {
        let path = self.config.match_rows_meta_path(key);
        fs::read_to_string(&path)
            .ok()
            .and_then(|s| match serde_json::from_str(&s) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!("Ignoring unreadable meta {:?}: {}", path, e);
                    None
                }
            })
            .unwrap_or_default()
    }

    fn load_rows(&self, key: &PlayerKey) -> Result<PlayerCacheState, StoreError> {
        let rows = JsonlReader::<MatchRow>::new(self.config.match_rows_path(key)).read_all()?;

        let records = rows
            .into_iter()
            .filter(|row| {
                if row.match_id != *row.detail.id() {
                    warn!(
                        "Skipping row {} for {}: detail carries id {}",
                        row.match_id,
                        key,
                        row.detail.id()
                    );
                    return false;
                }
                true
            })
            .map(|row| row.detail)
            .collect();

        Ok(PlayerCacheState::from_records(
            records,
            self.read_meta(key).last_updated,
        ))
    }

    fn append_rows(&self, key: &PlayerKey, state: &PlayerCacheState) -> Result<(), StoreError> {
        let path = self.config.match_rows_path(key);
        let existing: HashSet<MatchId> = JsonlReader::<MatchRow>::new(path.clone())
            .read_all()?
            .into_iter()
            .map(|row| row.match_id)
            .collect();

        let new_rows: Vec<MatchRow> = state
            .records()
            .iter()
            .filter(|r| !existing.contains(r.id()))
            .map(|r| MatchRow::new(key, r))
            .collect();

        let written = JsonlWriter::new(path).append_batch(&new_rows)?;

        fs::create_dir_all(self.config.rows_dir())?;
        let meta = RowsMeta {
            last_updated: state.last_updated(),
        };
        fs::write(
            self.config.match_rows_meta_path(key),
            serde_json::to_string_pretty(&meta)?,
        )?;

        info!(
            "Upserted {} new rows for {} ({} already stored)",
            written,
            key,
            existing.len()
        );
        Ok(())
    }

    fn remove_rows(&self, key: &PlayerKey) -> Result<bool, StoreError> {
        let mut removed = false;
        for path in [
            self.config.match_rows_path(key),
            self.config.match_rows_meta_path(key),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("row store task failed: {}", e)))?
}

#[async_trait]
impl MatchStore for JsonlRowStore {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn load(&self, key: &PlayerKey) -> Result<PlayerCacheState, StoreError> {
        let store = self.clone();
        let key = key.clone();
        run_blocking(move || store.load_rows(&key)).await
    }

    async fn save(&self, key: &PlayerKey, state: &PlayerCacheState) -> Result<(), StoreError> {
        let store = self.clone();
        let key = key.clone();
        let state = state.clone();
        run_blocking(move || store.append_rows(&key, &state)).await
    }

    async fn clear(&self, key: &PlayerKey) -> Result<bool, StoreError> {
        let store = self.clone();
        let key = key.clone();
        run_blocking(move || store.remove_rows(&key)).await
    }
}
