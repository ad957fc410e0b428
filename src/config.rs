//! Configuration file parser.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde and logged as warnings so typos show up.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{default_extraction_rules, ExtractionRule, NormalizeLimits};
use crate::util::UrlPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Fetch budget
// ============================================================================

/// Per-fetch resource budget. Passed by value into every fetch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssConfig {
    /// Absolute deadline for one fetch, in milliseconds.
    pub timeout_ms: u64,
    /// Byte ceiling on the retrieved document.
    pub max_content_length: usize,
}

impl RssConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 500_000;

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            max_content_length: Self::DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fetch deadline in milliseconds.
    pub timeout_ms: u64,

    /// Byte ceiling on a fetched feed document.
    pub max_content_length: usize,

    /// Upper bound on concurrent fetches within one sync cycle.
    pub max_concurrent_fetches: usize,

    /// Ceiling on a normalized item's content, in characters.
    pub max_item_content_chars: usize,

    /// Whether an entry with neither guid nor link may use its title as identity.
    pub allow_title_identity: bool,

    /// Allow sources pointing at localhost or private networks.
    pub allow_private_hosts: bool,

    /// Interval between scheduled sync cycles in `watch` mode. 0 = manual only.
    pub refresh_interval_minutes: u64,

    /// User-Agent header sent with feed requests.
    pub user_agent: String,

    /// SQLite database path. Relative paths resolve against the config directory.
    pub database: Option<PathBuf>,

    /// Custom-field extraction table applied to every feed document.
    pub extract: Vec<ExtractionRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: RssConfig::DEFAULT_TIMEOUT_MS,
            max_content_length: RssConfig::DEFAULT_MAX_CONTENT_LENGTH,
            max_concurrent_fetches: 8,
            max_item_content_chars: NormalizeLimits::DEFAULT_MAX_CONTENT_CHARS,
            allow_title_identity: true,
            allow_private_hosts: false,
            refresh_interval_minutes: 0,
            user_agent: concat!("feedsync/", env!("CARGO_PKG_VERSION")).to_string(),
            database: None,
            extract: default_extraction_rules(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "timeout_ms",
        "max_content_length",
        "max_concurrent_fetches",
        "max_item_content_chars",
        "allow_title_identity",
        "allow_private_hosts",
        "refresh_interval_minutes",
        "user_agent",
        "database",
        "extract",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
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

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            timeout_ms = config.timeout_ms,
            max_content_length = config.max_content_length,
            extract_rules = config.extract.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// The fetch budget handed to the fetcher on every call.
    pub fn rss(&self) -> RssConfig {
        RssConfig {
            timeout_ms: self.timeout_ms,
            max_content_length: self.max_content_length,
        }
    }

    pub fn normalize_limits(&self) -> NormalizeLimits {
        NormalizeLimits {
            max_content_chars: self.max_item_content_chars,
            allow_title_identity: self.allow_title_identity,
        }
    }

    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy {
            allow_private_hosts: self.allow_private_hosts,
        }
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_minutes > 0)
            .then(|| Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60)))
    }
}

// ============================================================================
// Tests
// ============================================================================
