//! Configuration file parser for ~/.config/bloom-opds/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use thiserror::Error;

use crate::channel::ChannelInfo;
use crate::feed::{FeedQuery, DEFAULT_BASE_URL};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// SEC-015: Custom Debug impl masks `account_key` and `api_key`.
#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    /// OPDS catalog endpoint.
    pub base_url: String,

    /// Locale requested from the catalog (e.g., "en", "en-GB").
    pub language: String,

    /// Ask the catalog to omit most navigation links.
    pub minimal_nav_links: bool,

    /// Ask the catalog to include ePUB acquisition links.
    pub epub: bool,

    /// Ask the catalog to group entries by language.
    pub organize_by_language: bool,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum accepted feed size in bytes.
    pub max_feed_size: usize,

    /// Bloom Library account key. Reserved: not sent with requests.
    #[serde(deserialize_with = "deserialize_secret")]
    pub account_key: Option<SecretString>,

    /// Bloom Library API key. Reserved: not sent with requests.
    #[serde(deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,

    /// Metadata of the channel built from the catalog.
    pub channel: ChannelInfo,
}

impl Default for Config {
    fn default() -> Self {
        let query = FeedQuery::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            language: query.language,
            minimal_nav_links: query.minimal_nav_links,
            epub: query.epub,
            organize_by_language: query.organize_by_language,
            timeout_secs: 30,
            max_feed_size: 10 * 1024 * 1024,
            account_key: None,
            api_key: None,
            channel: ChannelInfo::default(),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// SEC-015: Mask keys in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .field("minimal_nav_links", &self.minimal_nav_links)
            .field("epub", &self.epub)
            .field("organize_by_language", &self.organize_by_language)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_feed_size", &self.max_feed_size)
            .field("account_key", &self.account_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("channel", &self.channel)
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "base_url",
        "language",
        "minimal_nav_links",
        "epub",
        "organize_by_language",
        "timeout_secs",
        "max_feed_size",
        "account_key",
        "api_key",
        "channel",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
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
                // Race condition: file deleted between metadata and read
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
        tracing::info!(
            path = %path.display(),
            base_url = %config.base_url,
            language = %config.language,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Catalog query described by this configuration.
    pub fn feed_query(&self) -> FeedQuery {
        FeedQuery {
            language: self.language.clone(),
            minimal_nav_links: self.minimal_nav_links,
            epub: self.epub,
            organize_by_language: self.organize_by_language,
        }
    }

    /// Whether any catalog credential was configured. They are never sent.
    pub fn has_credentials(&self) -> bool {
        let present = |key: &Option<SecretString>| {
            key.as_ref()
                .is_some_and(|k| !k.expose_secret().trim().is_empty())
        };
        present(&self.account_key) || present(&self.api_key)
    }
}

// ============================================================================
// Tests
// ============================================================================
