//! Identifier newtypes for matches and players.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Upstream identifier of one completed match (e.g. `KR_7212345678`).
    ///
    /// Assigned once by the upstream source and never reused.
    MatchId
);

string_id!(
    /// Durable account key used to address cache storage.
    ///
    /// Unlike a [`RiotId`], this never changes when a player renames.
    PlayerKey
);

/// Human-facing account identity: display name plus tag line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RiotId {
    pub game_name: String,
    pub tag_line: String,
}

impl RiotId {
    pub fn new(game_name: impl Into<String>, tag_line: impl Into<String>) -> Self {
        Self {
            game_name: game_name.into(),
            tag_line: tag_line.into(),
        }
    }
}

impl fmt::Display for RiotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.game_name, self.tag_line)
    }
}

impl FromStr for RiotId {
    type Err = String;

    /// Parse `Name#TAG`. The split happens on the last `#`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, tag) = s
            .trim()
            .rsplit_once('#')
            .ok_or_else(|| format!("expected Name#TAG, got {:?}", s))?;

        let name = name.trim();
        let tag = tag.trim();
        if name.is_empty() || tag.is_empty() {
            return Err(format!("expected Name#TAG, got {:?}", s));
        }

        Ok(Self::new(name, tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_id_serializes_as_plain_string() {
        let id = MatchId::from("KR_1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"KR_1\"");

        let parsed: MatchId = serde_json::from_str("\"KR_1\"").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_id_display_and_debug() {
        let key = PlayerKey::new("abc-123");
        assert_eq!(format!("{}", key), "abc-123");
        assert_eq!(format!("{:?}", key), "PlayerKey(abc-123)");
    }

    #[test]
    fn test_id_ordering() {
        assert!(MatchId::from("KR_2") > MatchId::from("KR_1"));
    }

    #[test]
    fn test_riot_id_parse() {
        let id: RiotId = "Hide on bush#KR1".parse().unwrap();
        assert_eq!(id.game_name, "Hide on bush");
        assert_eq!(id.tag_line, "KR1");
        assert_eq!(id.to_string(), "Hide on bush#KR1");
    }

    #[test]
    fn test_riot_id_parse_splits_on_last_hash() {
        let id: RiotId = "a#b#TAG".parse().unwrap();
        assert_eq!(id.game_name, "a#b");
        assert_eq!(id.tag_line, "TAG");
    }

    #[test]
    fn test_riot_id_parse_rejects_missing_parts() {
        assert!("NoTag".parse::<RiotId>().is_err());
        assert!("#TAG".parse::<RiotId>().is_err());
        assert!("Name#".parse::<RiotId>().is_err());
    }
}
