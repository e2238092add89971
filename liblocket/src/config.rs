//! Configuration management for Locketdash
//!
//! Every section has defaults, so an empty file (or no file at all) is a
//! valid configuration. Only `feed.url` has to be supplied before the feed
//! can be loaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub nodes: NodesConfig,
}

/// Feed endpoint and loader tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Base URL of the caption feed (`next_token` is appended as a query parameter)
    pub url: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Automatic retries after a failed request
    pub max_retries: u32,
    /// First backoff delay; doubles with every retry
    pub base_delay_ms: u64,
    /// Coalescing window for "load more" triggers
    pub debounce_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
            max_retries: 3,
            base_delay_ms: 1000,
            debounce_ms: 200,
        }
    }
}

impl FeedConfig {
    /// The feed URL; unset and blank values are a missing field
    pub fn require_url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField("feed.url".to_string()).into())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Backend nodes watched by `locket-nodes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodesConfig {
    /// API nodes, probed at `<url>/keepalive`
    pub api: Vec<String>,
    /// Self-hosted backend chosen in the settings page
    pub custom: CustomBackendConfig,
    /// Database API, probed at `<url>/status`
    pub database_url: Option<String>,
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            api: Vec::new(),
            custom: CustomBackendConfig::default(),
            database_url: None,
            timeout_secs: 5,
            interval_secs: 300,
        }
    }
}

impl NodesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// The custom backend URL, if it is switched on
    pub fn active_custom_url(&self) -> Option<&str> {
        if self.custom.enabled {
            self.custom.url.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomBackendConfig {
    pub enabled: bool,
    pub url: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file at the default location yields the defaults. A path
    /// given through `LOCKET_CONFIG` must exist.
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path_from_env() {
            return Self::load_from_path(&path);
        }

        let path = resolve_config_path()?;
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.feed.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "feed.timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        if self.nodes.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "nodes.timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        if self.nodes.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "nodes.interval_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("LOCKET_CONFIG")
        .ok()
        .map(|path| PathBuf::from(shellexpand::tilde(&path).to_string()))
}

/// Resolve the configuration file path (`LOCKET_CONFIG`, then the XDG config dir)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Some(path) = config_path_from_env() {
        return Ok(path);
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("locketdash").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocketError;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.feed.max_retries, 3);
        assert_eq!(config.feed.base_delay(), Duration::from_secs(1));
        assert_eq!(config.feed.debounce(), Duration::from_millis(200));
        assert_eq!(config.feed.timeout(), Duration::from_secs(10));
        assert_eq!(config.nodes.timeout(), Duration::from_secs(5));
        assert_eq!(config.nodes.interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = Config::from_toml(
            r#"
[feed]
url = "https://feed.example.com/captions"
max_retries = 5

[nodes]
api = ["https://node1.example.com", "https://node2.example.com"]
database_url = "https://db.example.com"

[nodes.custom]
enabled = true
url = "https://self.example.com"
"#,
        )
        .unwrap();

        assert_eq!(config.feed.require_url().unwrap(), "https://feed.example.com/captions");
        assert_eq!(config.feed.max_retries, 5);
        assert_eq!(config.feed.debounce_ms, 200);
        assert_eq!(config.nodes.api.len(), 2);
        assert_eq!(config.nodes.active_custom_url(), Some("https://self.example.com"));
        assert_eq!(config.nodes.timeout_secs, 5);
    }

    #[test]
    fn test_disabled_custom_backend_is_not_active() {
        let config = Config::from_toml(
            r#"
[nodes.custom]
enabled = false
url = "https://self.example.com"
"#,
        )
        .unwrap();
        assert_eq!(config.nodes.active_custom_url(), None);
    }

    #[test]
    fn test_missing_feed_url_is_reported() {
        let config = Config::default();
        match config.feed.require_url() {
            Err(LocketError::Config(ConfigError::MissingField(field))) => {
                assert_eq!(field, "feed.url")
            }
            other => panic!("Expected missing field error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::from_toml("[feed]\ntimeout_secs = 0\n");
        assert!(matches!(
            result,
            Err(LocketError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml("[feed\nurl = ");
        assert!(matches!(
            result,
            Err(LocketError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_load_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[feed]\nurl = \"http://127.0.0.1:9/feed\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.feed.require_url().unwrap(), "http://127.0.0.1:9/feed");
    }

    #[test]
    #[serial]
    fn test_load_respects_env_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(&path, "[nodes]\ninterval_secs = 60\n").unwrap();

        std::env::set_var("LOCKET_CONFIG", path.to_str().unwrap());
        let config = Config::load().unwrap();
        std::env::remove_var("LOCKET_CONFIG");

        assert_eq!(config.nodes.interval(), Duration::from_secs(60));
    }

    #[test]
    #[serial]
    fn test_load_env_path_must_exist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.toml");

        std::env::set_var("LOCKET_CONFIG", path.to_str().unwrap());
        let result = Config::load();
        std::env::remove_var("LOCKET_CONFIG");

        assert!(matches!(
            result,
            Err(LocketError::Config(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_default() {
        std::env::remove_var("LOCKET_CONFIG");
        // No config dir at all (e.g. HOME unset in CI) is reported, not panicked on
        if let Ok(path) = resolve_config_path() {
            assert!(path.ends_with("locketdash/config.toml"));
        }
    }
}
