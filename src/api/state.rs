use std::sync::Arc;

use crate::coordinator::MatchCacheCoordinator;
use crate::models::RiotId;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<MatchCacheCoordinator>,
    pub players: Arc<Vec<RiotId>>,
    pub cors_origin: String,
}

impl AppState {
    pub fn new(coordinator: MatchCacheCoordinator, players: Vec<RiotId>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            players: Arc::new(players),
            cors_origin: "*".to_string(),
        }
    }

    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origin = origin.into();
        self
    }
}
