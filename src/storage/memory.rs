//! In-memory store.
//!
//! Scoped to the instance that owns it; nothing is shared between stores.
//! Load and save failures can be switched on to exercise degraded paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MatchStore, StoreError};
use crate::models::{PlayerCacheState, PlayerKey};

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<PlayerKey, PlayerCacheState>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `load` fail.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `save` fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Seed a player's state directly.
    pub async fn insert(&self, key: PlayerKey, state: PlayerCacheState) {
        self.entries.write().await.insert(key, state);
    }

    /// Stored state, bypassing failure injection.
    pub async fn snapshot(&self, key: &PlayerKey) -> Option<PlayerCacheState> {
        self.entries.read().await.get(key).cloned()
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, key: &PlayerKey) -> Result<PlayerCacheState, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("load disabled".to_string()));
        }
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, key: &PlayerKey, state: &PlayerCacheState) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("save disabled".to_string()));
        }
        self.entries.write().await.insert(key.clone(), state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self, key: &PlayerKey) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
