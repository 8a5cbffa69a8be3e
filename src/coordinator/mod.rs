//! Match cache coordinator.
//!
//! Reconciles a player's stored matches against the upstream's recent
//! match list:
//! 1. Load cached state and query recent ids (concurrently)
//! 2. Diff the id list against the cache
//! 3. Fetch details for unseen ids, all at once
//! 4. Merge, persist, return newest first
//!
//! A failed load is treated as an empty cache and a failed save is logged;
//! neither changes what the current caller receives. A failed detail batch
//! serves the cached records instead of a partial merge.
//!
//! Calls for the same player on one coordinator are serialized, so they
//! cannot overwrite each other's saves. Separate processes sharing a store
//! are not coordinated: with [`crate::storage::JsonFileStore`] the last save
//! wins and may drop matches the other process fetched (they reappear on the
//! next call, since they are then unseen again). [`crate::storage::JsonlRowStore`]
//! only appends, so it keeps both.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::models::{CacheStats, MatchId, MatchRecord, PlayerCacheState, PlayerKey, RiotId};
use crate::source::riot::MAX_MATCH_IDS_PER_REQUEST;
use crate::source::{IdentityResolver, MatchSource, SourceError};
use crate::storage::{MatchStore, StoreError};

/// Errors raised while synchronizing a player, tagged with the failing stage.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Identity lookup failed for {riot_id}: {source}")]
    Identity { riot_id: RiotId, source: SourceError },

    #[error("Match list fetch failed for {player}: {source}")]
    MatchList {
        player: PlayerKey,
        source: SourceError,
    },

    #[error("Match detail fetch failed for {match_id}: {source}")]
    MatchDetail {
        match_id: MatchId,
        source: SourceError,
    },

    #[error("Cache load failed for {player}: {source}")]
    Load { player: PlayerKey, source: StoreError },

    #[error("Cache save failed for {player}: {source}")]
    Save { player: PlayerKey, source: StoreError },
}

impl CoordinatorError {
    pub fn stage(&self) -> &'static str {
        match self {
            CoordinatorError::Identity { .. } => "identity",
            CoordinatorError::MatchList { .. } => "list",
            CoordinatorError::MatchDetail { .. } => "detail",
            CoordinatorError::Load { .. } => "load",
            CoordinatorError::Save { .. } => "save",
        }
    }

    /// Whether the stage leaves the caller without a usable result.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CoordinatorError::Load { .. } | CoordinatorError::Save { .. }
        )
    }

    /// The player does not exist upstream.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Identity {
                source: SourceError::NotFound(_),
                ..
            }
        )
    }
}

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Window used when a caller does not ask for a specific count
    pub default_count: u32,

    /// Propagate a failed detail batch instead of serving cached records
    pub strict_detail_failures: bool,

    /// Serialize calls for the same player on this coordinator
    pub serialize_per_player: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_count: 50,
            strict_detail_failures: false,
            serialize_per_player: true,
        }
    }
}

/// Outcome of one synchronization.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub player: PlayerKey,

    /// Every cached record plus anything fetched, newest first
    pub records: Vec<MatchRecord>,

    /// Upstream ids that were not cached when the call started
    pub new_ids: Vec<MatchId>,

    /// The cache was empty or unreadable
    pub cold: bool,

    /// New records were written to the store
    pub persisted: bool,

    /// The detail batch failed and `records` is the cache as loaded
    pub stale: bool,
}

/// Incremental match cache in front of the upstream API.
pub struct MatchCacheCoordinator {
    resolver: Arc<dyn IdentityResolver>,
    source: Arc<dyn MatchSource>,
    store: Arc<dyn MatchStore>,
    config: CoordinatorConfig,
    player_locks: Mutex<HashMap<PlayerKey, Arc<Mutex<()>>>>,
}

impl MatchCacheCoordinator {
    pub fn new(
        resolver: Arc<dyn IdentityResolver>,
        source: Arc<dyn MatchSource>,
        store: Arc<dyn MatchStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            resolver,
            source,
            store,
            config,
            player_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    /// Resolve a display identity to its stable key.
    pub async fn resolve(&self, riot_id: &RiotId) -> Result<PlayerKey, CoordinatorError> {
        self.resolver
            .resolve(riot_id)
            .await
            .map_err(|source| CoordinatorError::Identity {
                riot_id: riot_id.clone(),
                source,
            })
    }

    /// All known matches for a player, newest first, refreshed against the
    /// latest `requested_count` upstream matches.
    pub async fn get_matches(
        &self,
        riot_id: &RiotId,
        requested_count: u32,
    ) -> Result<Vec<MatchRecord>, CoordinatorError> {
        let key = self.resolve(riot_id).await?;
        Ok(self.sync_player(&key, requested_count).await?.records)
    }

    /// Synchronize one player by stable key.
    pub async fn sync_player(
        &self,
        player: &PlayerKey,
        requested_count: u32,
    ) -> Result<SyncReport, CoordinatorError> {
        let _guard = if self.config.serialize_per_player {
            Some(self.lock_player(player).await)
        } else {
            None
        };

        let count = requested_count.clamp(1, MAX_MATCH_IDS_PER_REQUEST);

        let (loaded, listed) = tokio::join!(
            self.store.load(player),
            self.source.list_recent_match_ids(player, count)
        );

        let mut state = loaded.unwrap_or_else(|source| {
            let err = CoordinatorError::Load {
                player: player.clone(),
                source,
            };
            warn!("{}; continuing with an empty cache", err);
            PlayerCacheState::empty()
        });
        let cold = state.is_empty();

        let recent = listed.map_err(|source| CoordinatorError::MatchList {
            player: player.clone(),
            source,
        })?;

        let new_ids = state.new_ids(&recent);
        if new_ids.is_empty() {
            debug!(
                "No new matches for {} ({} cached, {} listed)",
                player,
                state.len(),
                recent.len()
            );
            return Ok(SyncReport {
                player: player.clone(),
                records: state.into_records(),
                new_ids,
                cold,
                persisted: false,
                stale: false,
            });
        }

        info!(
            "Fetching {} new matches for {} ({} cached)",
            new_ids.len(),
            player,
            state.len()
        );

        let fetched = match self.fetch_details(&new_ids).await {
            Ok(records) => records,
            Err(e) if self.config.strict_detail_failures => return Err(e),
            Err(e) => {
                error!("{}; serving {} cached matches", e, state.len());
                return Ok(SyncReport {
                    player: player.clone(),
                    records: state.into_records(),
                    new_ids,
                    cold,
                    persisted: false,
                    stale: true,
                });
            }
        };

        let added = state.merge(fetched);
        state.touch(Utc::now());

        let persisted = match self.store.save(player, &state).await {
            Ok(()) => true,
            Err(source) => {
                let err = CoordinatorError::Save {
                    player: player.clone(),
                    source,
                };
                warn!("{}; returning in-memory result", err);
                false
            }
        };

        info!(
            "Merged {} new matches for {} ({} total, persisted: {})",
            added,
            player,
            state.len(),
            persisted
        );

        Ok(SyncReport {
            player: player.clone(),
            records: state.into_records(),
            new_ids,
            cold,
            persisted,
            stale: false,
        })
    }

    /// Drop a player's cache.
    pub async fn clear(&self, player: &PlayerKey) -> Result<bool, StoreError> {
        let _guard = self.lock_player(player).await;
        self.store.clear(player).await
    }

    pub async fn cache_stats(&self, player: &PlayerKey) -> Result<CacheStats, StoreError> {
        self.store.stats(player).await
    }

    /// Fetch every id concurrently. Any failure, including a payload for a
    /// different id, fails the whole batch.
    async fn fetch_details(&self, ids: &[MatchId]) -> Result<Vec<MatchRecord>, CoordinatorError> {
        let fetches = ids.iter().map(|id| async move {
            let record = self.source.match_detail(id).await.map_err(|source| {
                CoordinatorError::MatchDetail {
                    match_id: id.clone(),
                    source,
                }
            })?;

            // Keyed by payload id, a mismatch would never mark `id` as known.
            if record.id() != id {
                return Err(CoordinatorError::MatchDetail {
                    match_id: id.clone(),
                    source: SourceError::MismatchedId {
                        requested: id.clone(),
                        returned: record.id().clone(),
                    },
                });
            }
            Ok::<_, CoordinatorError>(record)
        });

        try_join_all(fetches).await
    }

    async fn lock_player(&self, player: &PlayerKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.player_locks.lock().await;
            // Forget locks nobody else is holding or waiting on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(player.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::mock::MockSource;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Harness {
        source: Arc<MockSource>,
        store: Arc<MemoryStore>,
        coordinator: MatchCacheCoordinator,
    }

    fn faker() -> RiotId {
        RiotId::new("Faker", "KR1")
    }

    fn key() -> PlayerKey {
        PlayerKey::from("puuid-faker")
    }

    fn harness_with(source: MockSource, config: CoordinatorConfig) -> Harness {
        let source = Arc::new(source.with_account(faker(), "puuid-faker"));
        let store = Arc::new(MemoryStore::new());
        let coordinator = MatchCacheCoordinator::new(
            source.clone(),
            source.clone(),
            store.clone(),
            config,
        );
        Harness {
            source,
            store,
            coordinator,
        }
    }

    fn harness(records: Vec<MatchRecord>) -> Harness {
        harness_with(
            MockSource::new().with_matches(records),
            CoordinatorConfig::default(),
        )
    }

    fn ids(records: &[MatchRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id().as_str()).collect()
    }

    fn mid(s: &str) -> MatchId {
        MatchId::from(s)
    }

    #[tokio::test]
    async fn test_cold_fetch_orders_by_creation_time() {
        let h = harness(vec![
            MatchRecord::new("m1", 300),
            MatchRecord::new("m2", 100),
            MatchRecord::new("m3", 200),
        ]);

        let records = h.coordinator.get_matches(&faker(), 50).await.unwrap();

        assert_eq!(ids(&records), vec!["m1", "m3", "m2"]);
        assert_eq!(h.source.detail_calls(), vec![mid("m1"), mid("m2"), mid("m3")]);

        let saved = h.store.snapshot(&key()).await.unwrap();
        assert_eq!(ids(saved.records()), vec!["m1", "m3", "m2"]);
        assert_eq!(saved.known_ids().len(), 3);
        assert!(saved.last_updated().is_some());
    }

    #[tokio::test]
    async fn test_second_call_is_idempotent_and_fetches_nothing() {
        let h = harness(vec![MatchRecord::new("m1", 300), MatchRecord::new("m2", 100)]);

        let first = h.coordinator.get_matches(&faker(), 50).await.unwrap();
        h.source.reset_calls();

        let report = h.coordinator.sync_player(&key(), 50).await.unwrap();

        assert_eq!(ids(&report.records), ids(&first));
        assert!(h.source.detail_calls().is_empty());
        assert!(report.new_ids.is_empty());
        assert!(!report.persisted);
        assert!(!report.cold);
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_only_unseen_ids_are_fetched() {
        let h = harness(vec![]);
        h.store
            .insert(
                key(),
                PlayerCacheState::from_records(
                    vec![
                        MatchRecord::new("A", 10),
                        MatchRecord::new("B", 20),
                        MatchRecord::new("C", 30),
                    ],
                    None,
                ),
            )
            .await;
        h.source.set_matches(vec![
            MatchRecord::new("D", 40),
            MatchRecord::new("C", 30),
            MatchRecord::new("B", 20),
            MatchRecord::new("A", 10),
        ]);

        let report = h.coordinator.sync_player(&key(), 50).await.unwrap();

        assert_eq!(h.source.detail_calls(), vec![mid("D")]);
        assert_eq!(report.new_ids, vec![mid("D")]);
        assert_eq!(ids(&report.records), vec!["D", "C", "B", "A"]);
        assert!(report.persisted);
    }

    #[tokio::test]
    async fn test_merge_has_no_duplicates() {
        let h = harness(vec![]);
        h.store
            .insert(
                key(),
                PlayerCacheState::from_records(
                    vec![MatchRecord::new("A", 100), MatchRecord::new("B", 300)],
                    None,
                ),
            )
            .await;
        // Upstream lists an id twice; it is fetched once and stored once.
        h.source.set_matches(vec![
            MatchRecord::new("C", 200),
            MatchRecord::new("C", 200),
            MatchRecord::new("A", 100),
        ]);

        let records = h.coordinator.get_matches(&faker(), 50).await.unwrap();

        assert_eq!(ids(&records), vec!["B", "C", "A"]);
        assert_eq!(h.source.detail_calls(), vec![mid("C")]);
    }

    #[tokio::test]
    async fn test_known_ids_never_shrink_as_window_moves() {
        let h = harness(vec![MatchRecord::new("m2", 200), MatchRecord::new("m1", 100)]);
        h.coordinator.sync_player(&key(), 2).await.unwrap();

        // Two newer games push the old ones out of the upstream window.
        h.source.set_matches(vec![
            MatchRecord::new("m4", 400),
            MatchRecord::new("m3", 300),
            MatchRecord::new("m2", 200),
        ]);
        let report = h.coordinator.sync_player(&key(), 2).await.unwrap();

        assert_eq!(ids(&report.records), vec!["m4", "m3", "m2", "m1"]);
        assert!(report.records.len() > 2);

        let saved = h.store.snapshot(&key()).await.unwrap();
        assert_eq!(saved.len(), 4);
    }

    #[tokio::test]
    async fn test_load_failure_degrades_to_cold_fetch() {
        let h = harness(vec![MatchRecord::new("m1", 300), MatchRecord::new("m2", 100)]);
        h.store
            .insert(
                key(),
                PlayerCacheState::from_records(vec![MatchRecord::new("m1", 300)], None),
            )
            .await;
        h.store.set_fail_loads(true);

        let report = h.coordinator.sync_player(&key(), 50).await.unwrap();

        assert!(report.cold);
        assert_eq!(ids(&report.records), vec!["m1", "m2"]);
        assert_eq!(h.source.detail_calls(), vec![mid("m1"), mid("m2")]);
    }

    #[tokio::test]
    async fn test_save_failure_still_returns_merged_result() {
        let h = harness(vec![MatchRecord::new("m1", 300), MatchRecord::new("m2", 100)]);
        h.store.set_fail_saves(true);

        let report = h.coordinator.sync_player(&key(), 50).await.unwrap();

        assert!(!report.persisted);
        assert_eq!(ids(&report.records), vec!["m1", "m2"]);
        assert!(h.store.snapshot(&key()).await.is_none());
    }

    #[tokio::test]
    async fn test_detail_failure_serves_cached_records() {
        let h = harness(vec![]);
        h.store
            .insert(
                key(),
                PlayerCacheState::from_records(vec![MatchRecord::new("old", 50)], None),
            )
            .await;
        h.source.set_matches(vec![
            MatchRecord::new("new1", 200),
            MatchRecord::new("new2", 100),
            MatchRecord::new("old", 50),
        ]);
        h.source.fail_detail("new2");

        let report = h.coordinator.sync_player(&key(), 50).await.unwrap();

        assert!(report.stale);
        assert!(!report.persisted);
        assert_eq!(ids(&report.records), vec!["old"]);
        assert_eq!(h.store.save_count(), 0);

        // Nothing partial was written; the next call retries both.
        let saved = h.store.snapshot(&key()).await.unwrap();
        assert_eq!(ids(saved.records()), vec!["old"]);
    }

    #[tokio::test]
    async fn test_strict_mode_propagates_detail_failure() {
        let h = harness_with(
            MockSource::new().with_matches(vec![MatchRecord::new("m1", 1)]),
            CoordinatorConfig {
                strict_detail_failures: true,
                ..Default::default()
            },
        );
        h.source.fail_detail("m1");

        let err = h.coordinator.sync_player(&key(), 50).await.unwrap_err();

        assert!(matches!(
            &err,
            CoordinatorError::MatchDetail { match_id, .. } if match_id.as_str() == "m1"
        ));
        assert_eq!(err.stage(), "detail");
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_mismatched_payload_id_fails_batch() {
        let h = harness(vec![MatchRecord::new("m0", 50)]);
        h.coordinator.sync_player(&key(), 50).await.unwrap();

        h.source.set_match_ids(vec![mid("KR_1"), mid("m0")]);
        h.source.set_detail("KR_1", MatchRecord::new("kr_1", 100));
        h.source.reset_calls();

        let report = h.coordinator.sync_player(&key(), 50).await.unwrap();

        assert!(report.stale);
        assert!(!report.persisted);
        assert_eq!(ids(&report.records), vec!["m0"]);
        assert_eq!(h.source.detail_calls(), vec![mid("KR_1")]);
        assert_eq!(h.store.save_count(), 1);

        let saved = h.store.snapshot(&key()).await.unwrap();
        assert!(!saved.contains(&mid("kr_1")));
    }

    #[tokio::test]
    async fn test_mismatched_payload_id_in_strict_mode() {
        let h = harness_with(
            MockSource::new(),
            CoordinatorConfig {
                strict_detail_failures: true,
                ..Default::default()
            },
        );
        h.source.set_match_ids(vec![mid("KR_1")]);
        h.source.set_detail("KR_1", MatchRecord::new("kr_1", 100));

        let err = h.coordinator.sync_player(&key(), 50).await.unwrap_err();

        assert!(matches!(
            &err,
            CoordinatorError::MatchDetail {
                match_id,
                source: SourceError::MismatchedId { returned, .. },
            } if match_id.as_str() == "KR_1" && returned.as_str() == "kr_1"
        ));
        assert_eq!(h.store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_matching_payloads_are_fetched_once_across_calls() {
        let h = harness(vec![MatchRecord::new("KR_1", 100)]);

        for _ in 0..3 {
            h.coordinator.sync_player(&key(), 50).await.unwrap();
        }

        assert_eq!(h.source.detail_calls(), vec![mid("KR_1")]);
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let h = harness(vec![MatchRecord::new("m1", 1)]);
        h.source.set_fail_list(true);

        let err = h.coordinator.get_matches(&faker(), 50).await.unwrap_err();

        assert!(matches!(err, CoordinatorError::MatchList { .. }));
        assert!(err.is_fatal());
        assert!(h.source.detail_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_player_is_not_found() {
        let h = harness(vec![]);

        let err = h
            .coordinator
            .get_matches(&RiotId::new("Nobody", "NA1"), 50)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.stage(), "identity");
        assert_eq!(h.source.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_details_are_fetched_concurrently() {
        let records: Vec<MatchRecord> = (0..5)
            .map(|i| MatchRecord::new(format!("m{}", i), i))
            .collect();
        let h = harness_with(
            MockSource::new()
                .with_matches(records)
                .with_detail_delay(Duration::from_millis(20)),
            CoordinatorConfig::default(),
        );

        let report = h.coordinator.sync_player(&key(), 50).await.unwrap();

        assert_eq!(report.records.len(), 5);
        assert_eq!(h.source.max_in_flight(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_calls_for_same_player_are_serialized() {
        let h = harness_with(
            MockSource::new()
                .with_matches(vec![
                    MatchRecord::new("m1", 3),
                    MatchRecord::new("m2", 2),
                    MatchRecord::new("m3", 1),
                ])
                .with_detail_delay(Duration::from_millis(10)),
            CoordinatorConfig::default(),
        );

        let k = key();
        let (a, b) = tokio::join!(
            h.coordinator.sync_player(&k, 50),
            h.coordinator.sync_player(&k, 50)
        );

        assert_eq!(a.unwrap().records.len(), 3);
        assert_eq!(b.unwrap().records.len(), 3);
        assert_eq!(h.source.detail_calls().len(), 3);
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_requested_count_is_clamped() {
        let h = harness(vec![MatchRecord::new("m1", 1), MatchRecord::new("m2", 2)]);

        h.coordinator.sync_player(&key(), 0).await.unwrap();
        assert_eq!(h.source.last_count(), 1);

        h.coordinator.sync_player(&key(), 1_000).await.unwrap();
        assert_eq!(h.source.last_count(), 100);
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let h = harness(vec![MatchRecord::new("m1", 1_700_000_000_000)]);
        h.coordinator.sync_player(&key(), 50).await.unwrap();

        let stats = h.coordinator.cache_stats(&key()).await.unwrap();
        assert_eq!(stats.count, 1);

        assert!(h.coordinator.clear(&key()).await.unwrap());
        assert_eq!(h.coordinator.cache_stats(&key()).await.unwrap().count, 0);
    }

    #[test]
    fn test_error_classification() {
        let load = CoordinatorError::Load {
            player: key(),
            source: StoreError::Unavailable("down".to_string()),
        };
        assert!(!load.is_fatal());
        assert_eq!(load.stage(), "load");
        assert_eq!(
            load.to_string(),
            "Cache load failed for puuid-faker: Store unavailable: down"
        );
    }

    #[test]
    fn test_config_default() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.default_count, 50);
        assert!(!config.strict_detail_failures);
        assert!(config.serialize_per_player);
    }
}
