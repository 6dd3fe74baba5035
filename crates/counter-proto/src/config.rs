use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

pub const ENV_API_BASE: &str = "COUNTER_API_BASE";
pub const ENV_STREAM_BASE: &str = "COUNTER_STREAM_BASE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

/// JSON API backend (login, identity, stats, cameras, reports).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Edge stream host serving the MJPEG feed and its health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_base")]
    pub base_url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_feed_path")]
    pub feed_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    /// Drop poll responses older than the newest committed cycle instead of
    /// letting the last response to complete win.
    #[serde(default)]
    pub discard_stale_cycles: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Where the bearer token issued by `/api/auth/login` is persisted.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_id")]
    pub id: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_stream_base(),
            health_path: default_health_path(),
            feed_path: default_feed_path(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval_secs(),
            health_interval_secs: default_health_interval_secs(),
            discard_stale_cycles: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            id: default_camera_id(),
        }
    }
}

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_stream_base() -> String {
    "http://localhost:5000".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_feed_path() -> String {
    "/video_feed".to_string()
}

fn default_stats_interval_secs() -> u64 {
    5
}

fn default_health_interval_secs() -> u64 {
    10
}

fn default_token_file() -> PathBuf {
    platform::data_dir().join("session.json")
}

fn default_camera_id() -> i64 {
    1
}

impl StreamConfig {
    pub fn health_url(&self) -> String {
        join_url(&self.base_url, &self.health_path)
    }

    pub fn feed_url(&self) -> String {
        join_url(&self.base_url, &self.feed_path)
    }
}

impl PollingConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        let mut config = if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            config
        } else {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Base URLs are deployment concerns, so the environment wins over the file.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = v.trim().to_string();
        }
        if let Some(v) = lookup(ENV_STREAM_BASE).filter(|v| !v.trim().is_empty()) {
            self.stream.base_url = v.trim().to_string();
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            stream: StreamConfig::default(),
            polling: PollingConfig::default(),
            session: SessionConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}
