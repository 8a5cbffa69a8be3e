//! Per-player cache state.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MatchId, MatchRecord};

/// Everything cached for one player.
///
/// `known_ids` always equals the set of record ids, and `records` is always
/// ordered newest first. Both are maintained by the constructors and
/// [`PlayerCacheState::merge`], which is why the fields are private.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerCacheState {
    known_ids: HashSet<MatchId>,
    records: Vec<MatchRecord>,
    last_updated: Option<DateTime<Utc>>,
}

/// Summary of a cached player, for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub count: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Newest first; equal creation times fall back to match id so the order is total.
fn newest_first(a: &MatchRecord, b: &MatchRecord) -> Ordering {
    b.game_creation()
        .cmp(&a.game_creation())
        .then_with(|| b.id().cmp(a.id()))
}

impl PlayerCacheState {
    /// State for a player that has never been persisted.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a state from an arbitrary record list.
    ///
    /// Duplicate ids keep the first occurrence. The id set is derived from
    /// the records, so a stored id list that drifted from its records is
    /// repaired rather than trusted.
    pub fn from_records(records: Vec<MatchRecord>, last_updated: Option<DateTime<Utc>>) -> Self {
        let mut state = Self {
            known_ids: HashSet::with_capacity(records.len()),
            records: Vec::with_capacity(records.len()),
            last_updated,
        };
        state.merge(records);
        state
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn contains(&self, id: &MatchId) -> bool {
        self.known_ids.contains(id)
    }

    pub fn known_ids(&self) -> &HashSet<MatchId> {
        &self.known_ids
    }

    /// Records, newest first.
    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<MatchRecord> {
        self.records
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated = Some(at);
    }

    /// Ids from `requested` that are not cached yet.
    ///
    /// Keeps the upstream order and drops repeats within `requested`.
    pub fn new_ids(&self, requested: &[MatchId]) -> Vec<MatchId> {
        let mut seen = HashSet::new();
        requested
            .iter()
            .filter(|id| !self.known_ids.contains(*id))
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect()
    }

    /// Merge fetched records into the cache.
    ///
    /// Records whose id is already known are ignored, so merging an
    /// overlapping batch never produces duplicates. Returns how many
    /// records were added.
    pub fn merge(&mut self, incoming: Vec<MatchRecord>) -> usize {
        let mut added = 0;
        for record in incoming {
            if self.known_ids.insert(record.id().clone()) {
                self.records.push(record);
                added += 1;
            }
        }

        if added > 0 {
            self.records.sort_by(newest_first);
        }
        added
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            count: self.records.len(),
            oldest: self.records.last().and_then(MatchRecord::created_at),
            newest: self.records.first().and_then(MatchRecord::created_at),
            last_updated: self.last_updated,
        }
    }
}
