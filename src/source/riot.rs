//! Riot Games REST client.
//!
//! Implements [`IdentityResolver`] and [`MatchSource`] against the
//! account-v1 and match-v5 endpoints. Every call carries its own timeout
//! and is retried once on transient failures; rate limiting is reported
//! to the caller rather than waited out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{IdentityResolver, MatchSource, SourceError};
use crate::models::{MatchId, MatchRecord, PlayerKey, RiotId};

/// Upstream caps the id list at 100 per request.
pub const MAX_MATCH_IDS_PER_REQUEST: u32 = 100;

/// Configuration for the Riot client.
#[derive(Debug, Clone)]
pub struct RiotClientConfig {
    /// Regional routing host, e.g. `https://asia.api.riotgames.com/`
    pub base_url: Url,

    /// Sent as `X-Riot-Token`
    pub api_key: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Extra attempts after a transient failure
    pub max_retries: u32,

    /// Pause before a retry
    pub retry_delay: Duration,

    /// Optional match type filter for the id list (e.g. "ranked")
    pub match_type: Option<String>,

    pub user_agent: String,
}

impl Default for RiotClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://asia.api.riotgames.com/").expect("static URL is valid"),
            api_key: String::new(),
            timeout: Duration::from_secs(10),
            max_retries: 1,
            retry_delay: Duration::from_millis(500),
            match_type: Some("ranked".to_string()),
            user_agent: format!("match-tracker/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RiotClientConfig {
    /// Fill `api_key` from the named environment variable.
    pub fn with_api_key_from_env(mut self, var: &str) -> Result<Self, SourceError> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => {
                self.api_key = key.trim().to_string();
                Ok(self)
            }
            _ => Err(SourceError::MissingApiKey(var.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    puuid: String,
}

/// HTTP client for the Riot API.
pub struct RiotClient {
    client: Client,
    config: RiotClientConfig,
}

impl RiotClient {
    pub fn new(config: RiotClientConfig) -> Result<Self, SourceError> {
        if config.api_key.is_empty() {
            return Err(SourceError::MissingApiKey("api_key".to_string()));
        }

        let mut token = HeaderValue::from_str(&config.api_key)
            .map_err(|_| SourceError::MissingApiKey("api_key".to_string()))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("x-riot-token"), token);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("match-tracker")),
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Build an endpoint URL from path segments. Segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(self.config.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn account_url(&self, riot_id: &RiotId) -> Result<Url, SourceError> {
        self.endpoint(&[
            "riot",
            "account",
            "v1",
            "accounts",
            "by-riot-id",
            &riot_id.game_name,
            &riot_id.tag_line,
        ])
    }

    fn match_ids_url(&self, player: &PlayerKey, count: u32) -> Result<Url, SourceError> {
        let mut url = self.endpoint(&[
            "lol",
            "match",
            "v5",
            "matches",
            "by-puuid",
            player.as_str(),
            "ids",
        ])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("start", "0");
            query.append_pair(
                "count",
                &count.clamp(1, MAX_MATCH_IDS_PER_REQUEST).to_string(),
            );
            if let Some(match_type) = &self.config.match_type {
                query.append_pair("type", match_type);
            }
        }
        Ok(url)
    }

    fn match_url(&self, match_id: &MatchId) -> Result<Url, SourceError> {
        self.endpoint(&["lol", "match", "v5", "matches", match_id.as_str()])
    }

    /// GET a JSON document, retrying transient failures.
    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, SourceError> {
        let mut attempt = 0;
        loop {
            match self.get_json_once(url).await {
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!("Retrying {} after error: {} (attempt {})", url.path(), e, attempt);
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                result => return result,
            }
        }
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T, SourceError> {
        debug!("GET {}", url.path());

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.path().to_string()));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            return Err(SourceError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                message: error_message(&body)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string()),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Pull a human-readable message out of an upstream error body.
///
/// Riot wraps errors as `{"status": {"message": ..}}`; proxies in front of
/// it tend to use a top-level `message` or `detail`.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/status/message")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("detail"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl IdentityResolver for RiotClient {
    async fn resolve(&self, riot_id: &RiotId) -> Result<PlayerKey, SourceError> {
        let url = self.account_url(riot_id)?;
        let account: AccountResponse = self.get_json(&url).await.map_err(|e| match e {
            SourceError::NotFound(_) => SourceError::NotFound(format!("account {}", riot_id)),
            other => other,
        })?;
        Ok(PlayerKey::new(account.puuid))
    }
}

#[async_trait]
impl MatchSource for RiotClient {
    async fn list_recent_match_ids(
        &self,
        player: &PlayerKey,
        count: u32,
    ) -> Result<Vec<MatchId>, SourceError> {
        let url = self.match_ids_url(player, count)?;
        self.get_json(&url).await
    }

    async fn match_detail(&self, match_id: &MatchId) -> Result<MatchRecord, SourceError> {
        let url = self.match_url(match_id)?;
        self.get_json(&url).await
    }
}
