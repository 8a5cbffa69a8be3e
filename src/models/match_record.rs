//! Upstream match detail payload.
//!
//! Only the fields the cache and the summaries read are typed. Everything
//! else the upstream sends is kept in `extra` so a record written back to
//! storage is the same document that was fetched.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{MatchId, PlayerKey};

/// Full detail record for one completed match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub metadata: MatchMetadata,
    pub info: MatchInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    pub match_id: MatchId,

    /// Player keys of everyone in the match, in participant order.
    #[serde(default)]
    pub participants: Vec<PlayerKey>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    /// Lobby creation time, epoch milliseconds.
    pub game_creation: i64,

    /// Game length in seconds.
    #[serde(default)]
    pub game_duration: i64,

    #[serde(default)]
    pub queue_id: i32,

    #[serde(default)]
    pub participants: Vec<Participant>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One player's line in a match.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Participant {
    pub puuid: String,
    pub riot_id_game_name: String,
    pub riot_id_tagline: String,
    pub champion_name: String,
    pub team_position: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub total_minions_killed: u32,
    pub neutral_minions_killed: u32,
    pub gold_earned: u32,

    /// Seconds this participant was in the game.
    pub time_played: u32,
    pub win: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MatchRecord {
    /// Minimal record with no participants.
    pub fn new(match_id: impl Into<MatchId>, game_creation: i64) -> Self {
        Self {
            metadata: MatchMetadata {
                match_id: match_id.into(),
                participants: Vec::new(),
                extra: Map::new(),
            },
            info: MatchInfo {
                game_creation,
                game_duration: 0,
                queue_id: 0,
                participants: Vec::new(),
                extra: Map::new(),
            },
        }
    }

    pub fn with_participants(mut self, participants: Vec<Participant>) -> Self {
        self.metadata.participants = participants
            .iter()
            .map(|p| PlayerKey::new(p.puuid.clone()))
            .collect();
        self.info.participants = participants;
        self
    }

    pub fn id(&self) -> &MatchId {
        &self.metadata.match_id
    }

    pub fn game_creation(&self) -> i64 {
        self.info.game_creation
    }

    /// Creation time as a UTC timestamp, if the millisecond value is in range.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.info.game_creation).single()
    }

    /// Find the participant entry for a player key.
    pub fn participant(&self, key: &PlayerKey) -> Option<&Participant> {
        self.info
            .participants
            .iter()
            .find(|p| p.puuid == key.as_str())
    }
}

impl Participant {
    /// Lane minions plus jungle monsters.
    pub fn creep_score(&self) -> u32 {
        self.total_minions_killed + self.neutral_minions_killed
    }
}
