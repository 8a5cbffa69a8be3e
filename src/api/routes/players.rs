use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::calculate::{
    best_champion, champion_stats, summarize_player, ChampionStats, PlayerSummary,
};
use crate::models::{CacheStats, MatchRecord, RiotId};

#[derive(Debug, Deserialize)]
pub struct CountQuery {
    pub count: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct PlayerListItem {
    pub riot_id: String,
    pub game_name: String,
    pub tag_line: String,
}

#[derive(Debug, Serialize)]
pub struct PlayersResponse {
    pub players: Vec<PlayerListItem>,
}

pub async fn list_players(State(state): State<AppState>) -> Json<PlayersResponse> {
    let players = state
        .players
        .iter()
        .map(|p| PlayerListItem {
            riot_id: p.to_string(),
            game_name: p.game_name.clone(),
            tag_line: p.tag_line.clone(),
        })
        .collect();

    Json(PlayersResponse { players })
}

fn riot_id_from_path(name: String, tag: String) -> Result<RiotId, ApiError> {
    if name.trim().is_empty() || tag.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Both name and tag are required".to_string(),
        ));
    }
    Ok(RiotId::new(name.trim(), tag.trim()))
}

#[derive(Debug, Serialize)]
pub struct MatchesResponse {
    pub player: String,
    pub total: usize,
    pub new_matches: usize,
    pub stale: bool,
    pub matches: Vec<MatchRecord>,
}

pub async fn matches(
    State(state): State<AppState>,
    Path((name, tag)): Path<(String, String)>,
    Query(query): Query<CountQuery>,
) -> Result<Json<MatchesResponse>, ApiError> {
    let riot_id = riot_id_from_path(name, tag)?;
    let coordinator = &state.coordinator;
    let count = query.count.unwrap_or(coordinator.config().default_count);

    let key = coordinator.resolve(&riot_id).await?;
    let report = coordinator.sync_player(&key, count).await?;

    Ok(Json(MatchesResponse {
        player: riot_id.to_string(),
        total: report.records.len(),
        new_matches: if report.stale { 0 } else { report.new_ids.len() },
        stale: report.stale,
        matches: report.records,
    }))
}

#[derive(Debug, Serialize)]
pub struct BestChampion {
    pub name: String,
    pub wins: u32,
    pub total: u32,
    pub win_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub player: String,
    pub summary: PlayerSummary,
    pub champions: BTreeMap<String, ChampionStats>,
    pub best_champion: Option<BestChampion>,
}

pub async fn summary(
    State(state): State<AppState>,
    Path((name, tag)): Path<(String, String)>,
    Query(query): Query<CountQuery>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let riot_id = riot_id_from_path(name, tag)?;
    let count = query
        .count
        .unwrap_or(state.coordinator.config().default_count);

    let records = state.coordinator.get_matches(&riot_id, count).await?;

    let summary = summarize_player(&records, &riot_id.game_name);
    let champions = champion_stats(&records, &[riot_id.game_name.clone()])
        .remove(&riot_id.game_name)
        .unwrap_or_default();
    let best = best_champion(&champions).map(|(name, stats)| BestChampion {
        name: name.to_string(),
        wins: stats.wins,
        total: stats.total,
        win_rate: stats.win_rate(),
    });

    Ok(Json(SummaryResponse {
        player: riot_id.to_string(),
        summary,
        best_champion: best,
        champions,
    }))
}

#[derive(Debug, Serialize)]
pub struct CacheResponse {
    pub player: String,
    pub key: String,
    pub stats: CacheStats,
}

pub async fn cache_stats(
    State(state): State<AppState>,
    Path((name, tag)): Path<(String, String)>,
) -> Result<Json<CacheResponse>, ApiError> {
    let riot_id = riot_id_from_path(name, tag)?;
    let key = state.coordinator.resolve(&riot_id).await?;
    let stats = state.coordinator.cache_stats(&key).await?;

    Ok(Json(CacheResponse {
        player: riot_id.to_string(),
        key: key.to_string(),
        stats,
    }))
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub player: String,
    pub cleared: bool,
}

pub async fn clear_cache(
    State(state): State<AppState>,
    Path((name, tag)): Path<(String, String)>,
) -> Result<Json<ClearResponse>, ApiError> {
    let riot_id = riot_id_from_path(name, tag)?;
    let key = state.coordinator.resolve(&riot_id).await?;
    let cleared = state.coordinator.clear(&key).await?;

    tracing::info!("Cleared cache for {} ({}): {}", riot_id, key, cleared);

    Ok(Json(ClearResponse {
        player: riot_id.to_string(),
        cleared,
    }))
}
