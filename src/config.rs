//! Runtime configuration for the scraper.
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables. Dedicated proxies are not part of this file; they
//! are read from `ISP_PROXY_<COUNTRY>` entries by [`crate::proxy::ProxyRegistry`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Desktop Chrome user agent; sites serve degraded markup to unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default provider API base URL.
pub const DEFAULT_API_URL: &str = "https://api.scrapeless.com/api/v2/browser";

/// Default base for CDP endpoints built from a bare session id.
pub const DEFAULT_CONNECT_URL: &str = "wss://browser.scrapeless.com/api/v2/browser";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("SCRAPER_API_KEY is required to talk to the browser provider")]
    MissingApiKey,
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub session: SessionSettings,
}

impl Settings {
    /// Load settings from an optional TOML file, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.with_env_overrides()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply environment variable overrides.
    ///
    /// - `SCRAPER_API_KEY` - provider API token
    /// - `SCRAPER_API_URL` - provider REST base URL
    /// - `SCRAPER_CONNECT_URL` - base for CDP endpoints built from a session id
    /// - `SCRAPER_SESSION_TTL_SECS` - remote session time-to-live
    /// - `SCRAPER_NAVIGATION_TIMEOUT_SECS` - per-navigation timeout
    /// - `SCRAPER_SETTLE_MS` - wait after navigation before reading the page
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(val) = non_empty("SCRAPER_API_KEY") {
            self.provider.api_key = Some(val);
        }
        if let Some(val) = non_empty("SCRAPER_API_URL") {
            self.provider.api_url = val;
        }
        if let Some(val) = non_empty("SCRAPER_CONNECT_URL") {
            self.provider.connect_url = val;
        }
        if let Some(val) = non_empty("SCRAPER_SESSION_TTL_SECS") {
            self.session.ttl_secs = parse_number("SCRAPER_SESSION_TTL_SECS", &val)?;
        }
        if let Some(val) = non_empty("SCRAPER_NAVIGATION_TIMEOUT_SECS") {
            self.session.navigation_timeout_secs =
                parse_number("SCRAPER_NAVIGATION_TIMEOUT_SECS", &val)?;
        }
        if let Some(val) = non_empty("SCRAPER_SETTLE_MS") {
            self.session.settle_ms = parse_number("SCRAPER_SETTLE_MS", &val)?;
        }

        Ok(self)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Remote browser provider connection settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// REST base URL used to create and release sessions.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API token sent as `x-api-token`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base for CDP endpoints when the provider only returns a session id.
    #[serde(default = "default_connect_url")]
    pub connect_url: String,

    /// Timeout for provider REST calls and CDP commands, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            connect_url: default_connect_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("connect_url", &self.connect_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Per-attempt browser session behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Server-side session time-to-live in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Navigation timeout in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Wait after navigation for late-binding content, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Captured HTML shorter than this is treated as an empty page.
    #[serde(default = "default_min_html_len")]
    pub min_html_len: usize,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl SessionSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            navigation_timeout_secs: default_navigation_timeout(),
            settle_ms: default_settle_ms(),
            min_html_len: default_min_html_len(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_connect_url() -> String {
    DEFAULT_CONNECT_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_ttl() -> u64 {
    300
}

fn default_navigation_timeout() -> u64 {
    60
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_min_html_len() -> usize {
    100
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.session.ttl(), Duration::from_secs(300));
        assert_eq!(settings.session.navigation_timeout(), Duration::from_secs(60));
        assert_eq!(settings.session.settle(), Duration::from_millis(2000));
        assert_eq!(settings.session.min_html_len, 100);
        assert_eq!(settings.provider.api_url, DEFAULT_API_URL);
        assert!(settings.provider.api_key.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[session]\nsettle_ms = 500\n\n[provider]\napi_url = \"http://localhost:9000\""
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.session.settle_ms, 500);
        assert_eq!(settings.session.ttl_secs, 300);
        assert_eq!(settings.provider.api_url, "http://localhost:9000");
        assert_eq!(settings.provider.connect_url, DEFAULT_CONNECT_URL);
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session\nttl_secs = ").unwrap();

        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SCRAPER_API_KEY", "sk_test"),
            ("SCRAPER_SESSION_TTL_SECS", "120"),
            ("SCRAPER_SETTLE_MS", ""),
        ]
        .into_iter()
        .collect();

        let settings = Settings::default()
            .with_overrides_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.provider.api_key.as_deref(), Some("sk_test"));
        assert_eq!(settings.session.ttl_secs, 120);
        // Empty values are ignored
        assert_eq!(settings.session.settle_ms, 2000);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let err = Settings::default()
            .with_overrides_from(|key| {
                (key == "SCRAPER_NAVIGATION_TIMEOUT_SECS").then(|| "soon".to_string())
            })
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ProviderConfig {
            api_key: Some("sk_live_123".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("sk_live_123"));
    }
}
