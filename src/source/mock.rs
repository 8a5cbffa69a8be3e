//! Scripted upstream for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{IdentityResolver, MatchSource, SourceError};
use crate::models::{MatchId, MatchRecord, PlayerKey, RiotId};

/// Upstream double that serves canned accounts, id lists and details and
/// records every call it receives.
#[derive(Default)]
pub struct MockSource {
    accounts: HashMap<RiotId, PlayerKey>,
    match_ids: Mutex<Vec<MatchId>>,
    details: Mutex<HashMap<MatchId, MatchRecord>>,
    failing_details: Mutex<HashSet<MatchId>>,
    fail_list: AtomicBool,
    detail_delay: Option<Duration>,

    detail_calls: Mutex<Vec<MatchId>>,
    list_calls: AtomicUsize,
    last_count: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, riot_id: RiotId, key: impl Into<PlayerKey>) -> Self {
        self.accounts.insert(riot_id, key.into());
        self
    }

    /// Hold every detail call open for `delay`.
    pub fn with_detail_delay(mut self, delay: Duration) -> Self {
        self.detail_delay = Some(delay);
        self
    }

    /// Serve `records` as details and their ids, in the given order, as the recent list.
    pub fn with_matches(self, records: Vec<MatchRecord>) -> Self {
        self.set_matches(records);
        self
    }

    pub fn set_matches(&self, records: Vec<MatchRecord>) {
        let ids = records.iter().map(|r| r.id().clone()).collect();
        *self.match_ids.lock().unwrap() = ids;
        let mut details = self.details.lock().unwrap();
        for record in records {
            details.insert(record.id().clone(), record);
        }
    }

    /// Replace the recent id list without touching details.
    pub fn set_match_ids(&self, ids: Vec<MatchId>) {
        *self.match_ids.lock().unwrap() = ids;
    }

    /// Serve `record` when `id` is requested, whatever id the record carries.
    pub fn set_detail(&self, id: impl Into<MatchId>, record: MatchRecord) {
        self.details.lock().unwrap().insert(id.into(), record);
    }

    pub fn fail_detail(&self, id: impl Into<MatchId>) {
        self.failing_details.lock().unwrap().insert(id.into());
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn detail_calls(&self) -> Vec<MatchId> {
        self.detail_calls.lock().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        self.detail_calls.lock().unwrap().clear();
        self.list_calls.store(0, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn last_count(&self) -> u32 {
        self.last_count.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityResolver for MockSource {
    async fn resolve(&self, riot_id: &RiotId) -> Result<PlayerKey, SourceError> {
        self.accounts
            .get(riot_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("account {}", riot_id)))
    }
}

#[async_trait]
impl MatchSource for MockSource {
    async fn list_recent_match_ids(
        &self,
        _player: &PlayerKey,
        count: u32,
    ) -> Result<Vec<MatchId>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.last_count.store(count, Ordering::SeqCst);

        if self.fail_list.load(Ordering::SeqCst) {
            return Err(SourceError::HttpStatus {
                status: 503,
                message: "Service Unavailable".to_string(),
            });
        }

        let ids = self.match_ids.lock().unwrap();
        Ok(ids.iter().take(count as usize).cloned().collect())
    }

    async fn match_detail(&self, match_id: &MatchId) -> Result<MatchRecord, SourceError> {
        self.detail_calls.lock().unwrap().push(match_id.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.detail_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_details.lock().unwrap().contains(match_id) {
            return Err(SourceError::RateLimited {
                retry_after_secs: 1,
            });
        }

        self.details
            .lock()
            .unwrap()
            .get(match_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("match {}", match_id)))
    }
}
