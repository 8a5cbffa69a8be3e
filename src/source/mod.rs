//! Upstream match data.
//!
//! The coordinator talks to the upstream through two traits so tests and
//! alternative backends can stand in for the real API:
//! - [`IdentityResolver`]: display name + tag to a stable player key
//! - [`MatchSource`]: recent match ids and full match details

#[cfg(test)]
pub mod mock;
pub mod riot;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{MatchId, MatchRecord, PlayerKey, RiotId};

pub use riot::{RiotClient, RiotClientConfig};

/// Errors returned by upstream collaborators.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API key not set (expected env var {0})")]
    MissingApiKey(String),

    #[error("Requested match {requested} but payload carries {returned}")]
    MismatchedId { requested: MatchId, returned: MatchId },
}

impl SourceError {
    /// Whether a single retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::HttpStatus { status, .. } => *status >= 500,
            SourceError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Resolves a human-facing identity to the durable key used for storage.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, riot_id: &RiotId) -> Result<PlayerKey, SourceError>;
}

/// Source of match ids and match details.
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Most recent match ids for a player, newest first. May return fewer than `count`.
    async fn list_recent_match_ids(
        &self,
        player: &PlayerKey,
        count: u32,
    ) -> Result<Vec<MatchId>, SourceError>;

    /// Full detail for one match.
    async fn match_detail(&self, match_id: &MatchId) -> Result<MatchRecord, SourceError>;
}
