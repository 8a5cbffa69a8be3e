//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::coordinator::CoordinatorConfig;
use crate::models::RiotId;
use crate::source::riot::MAX_MATCH_IDS_PER_REQUEST;
use crate::source::{RiotClientConfig, SourceError};
use crate::storage::StoreBackend;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Upstream API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiotConfig {
    /// Regional routing host
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Retries after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Match type filter for id lists; empty for all queues
    #[serde(default = "default_match_type")]
    pub match_type: String,
}

fn default_base_url() -> String {
    "https://asia.api.riotgames.com/".to_string()
}

fn default_api_key_env() -> String {
    "RIOT_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    1
}

fn default_match_type() -> String {
    "ranked".to_string()
}

impl Default for RiotConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            match_type: default_match_type(),
        }
    }
}

impl RiotConfig {
    /// Client configuration with the API key read from the environment.
    pub fn client_config(&self) -> Result<RiotClientConfig, SourceError> {
        let base_url =
            Url::parse(&self.base_url).map_err(|_| SourceError::InvalidUrl(self.base_url.clone()))?;

        RiotClientConfig {
            base_url,
            timeout: Duration::from_secs(self.timeout_seconds),
            max_retries: self.max_retries,
            match_type: Some(self.match_type.clone()).filter(|t| !t.is_empty()),
            ..Default::default()
        }
        .with_api_key_from_env(&self.api_key_env)
    }
}

/// Match cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// How many recent upstream matches each refresh considers
    #[serde(default = "default_request_count")]
    pub request_count: u32,

    #[serde(default)]
    pub strict_detail_failures: bool,

    #[serde(default = "default_true")]
    pub serialize_per_player: bool,
}

fn default_request_count() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            request_count: default_request_count(),
            strict_detail_failures: false,
            serialize_per_player: true,
        }
    }
}

impl CacheConfig {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            default_count: self.request_count,
            strict_detail_failures: self.strict_detail_failures,
            serialize_per_player: self.serialize_per_player,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

/// A tracked account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub game_name: String,
    pub tag_line: String,
}

impl PlayerEntry {
    pub fn riot_id(&self) -> RiotId {
        RiotId::new(self.game_name.clone(), self.tag_line.clone())
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub riot: RiotConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub players: Vec<PlayerEntry>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            riot: RiotConfig::default(),
            cache: CacheConfig::default(),
            server: ServerConfig::default(),
            players: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &PathBuf) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.riot.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Riot timeout must be greater than 0".to_string(),
            ));
        }

        if Url::parse(&self.riot.base_url).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "Riot base_url is not a valid URL: {}",
                self.riot.base_url
            )));
        }

        if self.cache.request_count == 0 || self.cache.request_count > MAX_MATCH_IDS_PER_REQUEST {
            return Err(ConfigError::ValidationError(format!(
                "Cache request_count must be between 1 and {}",
                MAX_MATCH_IDS_PER_REQUEST
            )));
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if let Some(p) = self
            .players
            .iter()
            .find(|p| p.game_name.trim().is_empty() || p.tag_line.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(format!(
                "Player entry needs both game_name and tag_line: {:?}",
                p
            )));
        }

        Ok(())
    }
}
