//! Configuration file parser for ~/.config/newsline/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde, though we log a warning when
//! the file contains potential typos. Provider API keys may also come from
//! the environment, which takes precedence over the file.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::util::{validate_base_url, UrlValidationError};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A provider base URL is not HTTPS (localhost excepted).
    #[error("Invalid base URL for {provider}: {source}")]
    InsecureBaseUrl {
        provider: &'static str,
        #[source]
        source: UrlValidationError,
    },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file; `None` means `<config dir>/news.db`.
    pub database_path: Option<PathBuf>,

    /// Minutes between scheduled ingestion runs.
    pub fetch_interval_minutes: u64,

    pub newsapi: NewsApiConfig,
    pub guardian: GuardianConfig,
    pub nyt: NytConfig,
    pub http: HttpConfig,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            fetch_interval_minutes: 60,
            newsapi: NewsApiConfig::default(),
            guardian: GuardianConfig::default(),
            nyt: NytConfig::default(),
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Headline provider (NewsAPI top-headlines).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct NewsApiConfig {
    /// Overridden by `NEWSAPI_KEY`.
    pub api_key: Option<String>,
    pub base_url: String,
    pub language: String,
    /// Articles requested per category.
    pub page_size: u32,
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://newsapi.org/v2".to_string(),
            language: "en".to_string(),
            page_size: 10,
        }
    }
}

/// Search provider (Guardian content search).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    /// Overridden by `GUARDIAN_API_KEY`.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Free-text query; omitted from the request when `None`.
    pub query: Option<String>,
    /// Section filter; omitted from the request when `None`.
    pub section: Option<String>,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://content.guardianapis.com".to_string(),
            query: None,
            section: None,
        }
    }
}

/// Top-stories provider (NYT).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct NytConfig {
    /// Overridden by `NYT_API_KEY`.
    pub api_key: Option<String>,
    pub base_url: String,
    pub section: String,
}

impl Default for NytConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.nytimes.com/svc".to_string(),
            section: "home".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Whole-request timeout, connect included.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts in total, first try included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random delay added to each backoff.
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
            jitter_ms: 250,
        }
    }
}

// API keys are masked in Debug output so they never reach logs.
impl std::fmt::Debug for NewsApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsApiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl std::fmt::Debug for GuardianConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardianConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("query", &self.query)
            .field("section", &self.section)
            .finish()
    }
}

impl std::fmt::Debug for NytConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NytConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("section", &self.section)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "database_path",
        "fetch_interval_minutes",
        "newsapi",
        "guardian",
        "nyt",
        "http",
        "retry",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted, logged as warning
    /// - Non-HTTPS base URL (other than localhost) → `Err(ConfigError::InsecureBaseUrl)`
    ///
    /// Does not consult the environment; see [`Config::apply_env`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            interval_minutes = config.fetch_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Overlay provider API keys from `NEWSAPI_KEY`, `GUARDIAN_API_KEY` and
    /// `NYT_API_KEY`. Set variables win over the file.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let slots = [
            ("NEWSAPI_KEY", &mut self.newsapi.api_key),
            ("GUARDIAN_API_KEY", &mut self.guardian.api_key),
            ("NYT_API_KEY", &mut self.nyt.api_key),
        ];
        for (name, slot) in slots {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                tracing::debug!(var = name, "API key taken from environment");
                *slot = Some(value);
            }
        }
    }

    /// Check every provider base URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("newsapi", &self.newsapi.base_url),
            ("guardian", &self.guardian.base_url),
            ("nyt", &self.nyt.base_url),
        ];
        for (provider, url) in urls {
            validate_base_url(url)
                .map_err(|source| ConfigError::InsecureBaseUrl { provider, source })?;
        }
        Ok(())
    }

    /// Interval between scheduled runs, never shorter than one minute.
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_minutes.max(1) * 60)
    }
}

// ============================================================================
// Tests
// ============================================================================
