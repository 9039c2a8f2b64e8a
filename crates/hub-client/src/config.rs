//! Client configuration loaded from the environment.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::api::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid API URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Client configuration.
///
/// Environment variables are prefixed with `HUB_`:
/// - `HUB_API_URL`: backend base URL (default: "http://127.0.0.1:8000/api")
/// - `HUB_TIMEOUT_SECS`: per-request timeout (default: 30)
/// - `HUB_RETRY_MAX_ATTEMPTS`: attempts for retrying calls (default: 3)
/// - `HUB_RETRY_BASE_DELAY_MS`: first backoff delay (default: 1000)
/// - `HUB_REDIRECT_DELAY_MS`: pause before clearing an expired session (default: 1500)
/// - `HUB_SESSION_FILE`: session file path (default: ~/.company-hub/session.yaml)
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_redirect_delay_ms")]
    pub redirect_delay_ms: u64,

    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

fn default_api_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_redirect_delay_ms() -> u64 {
    1500
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = envy::prefixed("HUB_").from_env::<ClientConfig>()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.api_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.api_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            redirect_delay_ms: default_redirect_delay_ms(),
            session_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url(), "http://127.0.0.1:8000/api");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_url_trims_slash() {
        let config = ClientConfig::default().with_api_url("http://hub.local/api/");
        assert_eq!(config.base_url(), "http://hub.local/api");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = ClientConfig::default().with_api_url("not a url");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_deserialize_partial_env() {
        let vars = vec![
            ("HUB_TIMEOUT_SECS".to_string(), "5".to_string()),
            ("HUB_SESSION_FILE".to_string(), "/tmp/hub.yaml".to_string()),
        ];
        let config: ClientConfig = envy::prefixed("HUB_").from_iter(vars).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.session_file, Some(PathBuf::from("/tmp/hub.yaml")));
        assert_eq!(config.redirect_delay_ms, 1500);
    }
}
