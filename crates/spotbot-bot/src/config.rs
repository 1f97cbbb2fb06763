//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Exchange connection configuration.
///
/// Credentials are never stored in the file; the config names the
/// environment variables they are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// REST API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Environment variable holding the API secret.
    #[serde(default = "default_api_secret_env")]
    pub api_secret_env: String,
}

fn default_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_api_key_env() -> String {
    "SPOTBOT_API_KEY".to_string()
}

fn default_api_secret_env() -> String {
    "SPOTBOT_API_SECRET".to_string()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            api_secret_env: default_api_secret_env(),
        }
    }
}

impl ExchangeConfig {
    /// Read the API credentials from the configured environment variables.
    pub fn credentials(&self) -> AppResult<(String, String)> {
        let key = std::env::var(&self.api_key_env)
            .map_err(|_| AppError::Config(format!("{} is not set", self.api_key_env)))?;
        let secret = std::env::var(&self.api_secret_env)
            .map_err(|_| AppError::Config(format!("{} is not set", self.api_secret_env)))?;
        Ok((key, secret))
    }
}

/// Cache lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Staleness horizon for the exchange metadata snapshot (seconds).
    #[serde(default = "default_metadata_max_age_secs")]
    pub metadata_max_age_secs: u64,
    /// Time-to-live for the bulk ticker price snapshot (seconds).
    #[serde(default = "default_ticker_ttl_secs")]
    pub ticker_ttl_secs: u64,
}

fn default_metadata_max_age_secs() -> u64 {
    300
}

fn default_ticker_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_max_age_secs: default_metadata_max_age_secs(),
            ticker_ttl_secs: default_ticker_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn metadata_max_age(&self) -> Duration {
        Duration::from_secs(self.metadata_max_age_secs)
    }

    pub fn ticker_ttl(&self) -> Duration {
        Duration::from_secs(self.ticker_ttl_secs)
    }
}

/// Price-move alert scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertScheduleConfig {
    /// How often the watch list is evaluated (seconds).
    #[serde(default = "default_alert_check_interval_secs")]
    pub check_interval_secs: u64,
}

fn default_alert_check_interval_secs() -> u64 {
    300
}

impl Default for AlertScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_alert_check_interval_secs(),
        }
    }
}

impl AlertScheduleConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Exchange connection.
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Cache lifetimes.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Alert scheduling.
    #[serde(default)]
    pub alerts: AlertScheduleConfig,
}

impl AppConfig {
    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;

        toml::from_str(&content).map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.exchange.base_url, "https://api.binance.com");
        assert_eq!(config.cache.metadata_max_age(), Duration::from_secs(300));
        assert_eq!(config.cache.ticker_ttl(), Duration::from_secs(60));
        assert_eq!(config.alerts.check_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [exchange]
            base_url = "https://testnet.example.com"

            [cache]
            ticker_ttl_secs = 15
            "#,
        )
        .unwrap();
        assert_eq!(config.exchange.base_url, "https://testnet.example.com");
        assert_eq!(config.exchange.api_key_env, "SPOTBOT_API_KEY");
        assert_eq!(config.cache.ticker_ttl_secs, 15);
        assert_eq!(config.cache.metadata_max_age_secs, 300);
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&AppConfig::default()).unwrap();
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("check_interval_secs"));
    }

    #[test]
    fn test_missing_credentials_is_a_config_error() {
        let exchange = ExchangeConfig {
            api_key_env: "SPOTBOT_TEST_UNSET_KEY".to_string(),
            api_secret_env: "SPOTBOT_TEST_UNSET_SECRET".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            exchange.credentials(),
            Err(AppError::Config(_))
        ));
    }
}
