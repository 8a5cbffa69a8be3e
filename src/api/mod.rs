//! REST API endpoints.
//!
//! Axum-based HTTP API serving cached matches, per-player summaries and
//! cache maintenance for the tracked roster.

pub mod routes;
pub mod state;

use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::coordinator::CoordinatorError;
use crate::storage::StoreError;

use state::AppState;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        if err.is_not_found() {
            ApiError::NotFound(err.to_string())
        } else if err.is_fatal() {
            ApiError::BadGateway(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::DELETE, Method::OPTIONS]);

    match origin.parse::<HeaderValue>() {
        Ok(value) if origin != "*" => cors.allow_origin(value).allow_headers(Any),
        _ => cors.allow_origin(Any).allow_headers(Any),
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origin);

    Router::new()
        .route("/health", get(routes::players::health))
        .route("/api/players", get(routes::players::list_players))
        .route(
            "/api/players/:name/:tag/matches",
            get(routes::players::matches),
        )
        .route(
            "/api/players/:name/:tag/summary",
            get(routes::players::summary),
        )
        .route(
            "/api/players/:name/:tag/cache",
            get(routes::players::cache_stats).delete(routes::players::clear_cache),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
