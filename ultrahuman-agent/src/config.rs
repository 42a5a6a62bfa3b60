//! Configuration management with secure token storage
//!
//! Handles:
//! - Partner API settings (endpoint, timeout)
//! - API token (OS keyring, never written to the config file)
//! - Polling interval
//! - Entity publication targets (log, MQTT, HTTP read API)

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_URL: &str = "https://partner.ultrahuman.com/api/v1/partner/daily_metrics";
pub const API_TIMEOUT_SECS: u64 = 15;

pub const DEFAULT_UPDATE_INTERVAL_MINUTES: u32 = 60;
pub const MIN_UPDATE_INTERVAL_MINUTES: u32 = 5;
pub const MAX_UPDATE_INTERVAL_MINUTES: u32 = 1440;

pub const DEFAULT_TITLE: &str = "Ultrahuman Ring";

const KEYRING_SERVICE: &str = "ultrahuman-agent";
const KEYRING_USER: &str = "api-token";

pub const ENV_API_TOKEN: &str = "ULTRAHUMAN_API_TOKEN";
pub const ENV_UPDATE_INTERVAL: &str = "ULTRAHUMAN_UPDATE_INTERVAL";
pub const ENV_CONFIG_PATH: &str = "ULTRAHUMAN_AGENT_CONFIG";

/// Problems that make a configuration unusable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("API token is missing")]
    MissingToken,
    #[error("Update interval {0} min is outside 5..=1440")]
    IntervalOutOfRange(u32),
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub entry: EntryInfo,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    #[serde(skip)] // Never serialize the token
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub update_interval_minutes: u32,
}

/// Identity of this configured entry; prefixes entity unique ids
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryInfo {
    pub entry_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Render every entity state through the log
    pub log_states: bool,
    /// Socket address for the HTTP read API (e.g. "127.0.0.1:8089")
    pub http_bind: Option<String>,
    pub mqtt: Option<MqttConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: Option<String>,
    pub keep_alive_secs: u16,
    /// State topics live under `<topic_prefix>/<key>/state`
    pub topic_prefix: String,
    /// Discovery documents live under `<discovery_prefix>/sensor/<unique_id>/config`
    pub discovery_prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: API_URL.to_string(),
            timeout_secs: API_TIMEOUT_SECS,
            token: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            update_interval_minutes: DEFAULT_UPDATE_INTERVAL_MINUTES,
        }
    }
}

impl Default for EntryInfo {
    fn default() -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().simple().to_string(),
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            log_states: true,
            http_bind: None,
            mqtt: None,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            client_id: None,
            keep_alive_secs: 60,
            topic_prefix: "ultrahuman".to_string(),
            discovery_prefix: "homeassistant".to_string(),
        }
    }
}

impl AgentConfig {
    /// Load config from the OS-specific location (or `ULTRAHUMAN_AGENT_CONFIG`),
    /// then the keyring token, then environment overrides.
    pub async fn load() -> Result<Self> {
        Self::load_at(&Self::config_file_path()?).await
    }

    /// Same as `load`, with an explicit config path
    pub async fn load_at(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            Self::load_from(config_path).await?
        } else {
            // First time setup - return default config
            Self::default()
        };

        config.api.token = Self::load_token().ok();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a config file without touching the keyring or environment
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AgentConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Save config to the OS-specific location, token to the keyring
    pub async fn save(&self) -> Result<()> {
        self.save_at(&Self::config_file_path()?).await
    }

    /// Same as `save`, with an explicit config path
    pub async fn save_at(&self, config_path: &Path) -> Result<()> {
        self.save_with(config_path, Self::save_token).await
    }

    /// Store the token before writing the file, so an existing config file
    /// always has its token persisted.
    async fn save_with<F>(&self, config_path: &Path, store_token: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<()>,
    {
        if let Some(token) = &self.api.token {
            store_token(token).context("Failed to store the API token in the OS keyring")?;
        }

        self.save_to(config_path).await
    }

    /// Write the config file (without the token)
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Config path: `ULTRAHUMAN_AGENT_CONFIG` or `<config_dir>/ultrahuman-agent/config.toml`
    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(custom) = std::env::var(ENV_CONFIG_PATH) {
            return Ok(PathBuf::from(custom));
        }

        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("ultrahuman-agent");
        path.push("config.toml");
        Ok(path)
    }

    /// Check if this is first-time setup
    pub fn is_first_time_setup() -> bool {
        Self::config_file_path()
            .map(|p| !p.exists())
            .unwrap_or(true)
    }

    /// Apply `ULTRAHUMAN_API_TOKEN` / `ULTRAHUMAN_UPDATE_INTERVAL`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_API_TOKEN).ok(),
            std::env::var(ENV_UPDATE_INTERVAL).ok(),
        );
    }

    fn apply_overrides(&mut self, token: Option<String>, interval: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.api.token = Some(token.trim().to_string());
        }

        if let Some(raw) = interval {
            match raw.trim().parse::<u32>() {
                Ok(minutes) => self.polling.update_interval_minutes = minutes,
                Err(_) => tracing::warn!("Ignoring invalid {}: {:?}", ENV_UPDATE_INTERVAL, raw),
            }
        }
    }

    /// Check the user-facing configuration surface
    pub fn validate(&self) -> Result<(), ConfigError> {
        let token_ok = self
            .api
            .token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if !token_ok {
            return Err(ConfigError::MissingToken);
        }

        validate_interval(self.polling.update_interval_minutes)?;

        match reqwest::Url::parse(&self.api.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(ConfigError::InvalidBaseUrl(self.api.base_url.clone())),
        }
    }

    /// Refresh period, clamped to the supported range
    pub fn update_interval(&self) -> Duration {
        let minutes = self
            .polling
            .update_interval_minutes
            .clamp(MIN_UPDATE_INTERVAL_MINUTES, MAX_UPDATE_INTERVAL_MINUTES);
        Duration::from_secs(u64::from(minutes) * 60)
    }

    /// Load token from secure OS keyring
    fn load_token() -> Result<String> {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        entry.get_password().map_err(Into::into)
    }

    /// Save token to secure OS keyring
    fn save_token(token: &str) -> Result<()> {
        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        entry.set_password(token).map_err(Into::into)
    }
}

pub fn validate_interval(minutes: u32) -> Result<(), ConfigError> {
    if (MIN_UPDATE_INTERVAL_MINUTES..=MAX_UPDATE_INTERVAL_MINUTES).contains(&minutes) {
        Ok(())
    } else {
        Err(ConfigError::IntervalOutOfRange(minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.api.token = Some("secret".into());
        config
    }

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.api.base_url, API_URL);
        assert_eq!(config.api.timeout(), Duration::from_secs(15));
        assert_eq!(config.polling.update_interval_minutes, 60);
        assert_eq!(config.entry.title, "Ultrahuman Ring");
        assert!(!config.entry.entry_id.is_empty());
        assert!(config.publish.log_states);
        assert!(config.publish.mqtt.is_none());
    }

    #[test]
    fn test_validate() {
        assert_eq!(AgentConfig::default().validate(), Err(ConfigError::MissingToken));
        assert_eq!(configured().validate(), Ok(()));

        let mut blank = configured();
        blank.api.token = Some("   ".into());
        assert_eq!(blank.validate(), Err(ConfigError::MissingToken));

        let mut bad_url = configured();
        bad_url.api.base_url = "ftp://example.com".into();
        assert!(matches!(bad_url.validate(), Err(ConfigError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_interval_bounds() {
        assert!(validate_interval(5).is_ok());
        assert!(validate_interval(1440).is_ok());
        assert_eq!(validate_interval(4), Err(ConfigError::IntervalOutOfRange(4)));
        assert_eq!(validate_interval(1441), Err(ConfigError::IntervalOutOfRange(1441)));

        let mut config = configured();
        config.polling.update_interval_minutes = 2;
        assert_eq!(config.validate(), Err(ConfigError::IntervalOutOfRange(2)));
        assert_eq!(config.update_interval(), Duration::from_secs(5 * 60));
    }

    #[test]
    fn test_overrides() {
        let mut config = AgentConfig::default();
        config.apply_overrides(Some(" tok ".into()), Some("15".into()));
        assert_eq!(config.api.token.as_deref(), Some("tok"));
        assert_eq!(config.polling.update_interval_minutes, 15);

        config.apply_overrides(Some("".into()), Some("soon".into()));
        assert_eq!(config.api.token.as_deref(), Some("tok"));
        assert_eq!(config.polling.update_interval_minutes, 15);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = configured();
        config.polling.update_interval_minutes = 30;
        config.publish.mqtt = Some(MqttConfig::default());
        config.save_to(&path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("secret"));

        let loaded = AgentConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded.polling.update_interval_minutes, 30);
        assert_eq!(loaded.entry.entry_id, config.entry.entry_id);
        assert_eq!(loaded.publish.mqtt, Some(MqttConfig::default()));
        assert!(loaded.api.token.is_none());
    }

    #[tokio::test]
    async fn test_keyring_failure_leaves_no_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let result = configured()
            .save_with(&path, |_| anyhow::bail!("no secret service"))
            .await;

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_token_stored_before_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut stored = None;

        configured()
            .save_with(&path, |token| {
                assert!(!path.exists());
                stored = Some(token.to_string());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(stored.as_deref(), Some("secret"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[polling]\nupdate_interval_minutes = 10\n").unwrap();

        let loaded = AgentConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded.polling.update_interval_minutes, 10);
        assert_eq!(loaded.api.base_url, API_URL);
    }
}
