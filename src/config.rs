//! Configuration file parser for tidepool.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`,
//! which leaves every channel disabled. Unknown keys are silently ignored by
//! serde, though a warning is logged for probable typos. Access tokens may
//! come from the file or from environment variables; the environment wins.
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

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
// Configuration Structs
// ============================================================================

/// Policy and credentials for one social channel.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Whether announcements are composed and dispatched for this channel.
    pub enabled: bool,

    /// API base URL (override for self-hosted instances and tests).
    pub base_url: String,

    /// Bearer token. The TIDEPOOL_TWEET_TOKEN / TIDEPOOL_TOOT_TOKEN
    /// environment variables take precedence over this field.
    pub access_token: Option<String>,

    /// Maximum number of times one article may be announced on this channel.
    pub max_per_article: i64,

    /// Minimum hours between repeat announcements of the same article.
    pub hours_between: i64,

    /// Terms that trigger a content warning when they appear as whole words
    /// in an article's title or tags. Only consulted for the toot channel.
    pub content_warning_terms: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            access_token: None,
            max_per_article: 3,
            hours_between: 12,
            content_warning_terms: Vec::new(),
        }
    }
}

/// Read-later fan-out settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PocketConfig {
    pub enabled: bool,

    /// API base URL (override for tests).
    pub base_url: String,

    /// Application consumer key. TIDEPOOL_POCKET_KEY takes precedence.
    pub consumer_key: Option<String>,

    /// Pause between consecutive submissions, to respect the upstream
    /// rate limit.
    pub submit_delay_secs: u64,
}

impl Default for PocketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://getpocket.com".to_string(),
            consumer_key: None,
            submit_delay_secs: 2,
        }
    }
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified; missing keys fall back to `Default::default()`.
///
/// The custom `Debug` impl masks tokens to prevent secret leakage in logs
/// and error messages.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Community name, used in registration announcements and Pocket tags.
    pub app_name: String,

    /// Public URL of the hub.
    pub app_url: String,

    /// SQLite database path.
    pub database_path: String,

    /// Locale tag governing tag/term case-folding. Folding is Unicode-aware
    /// regardless; the tag is recorded for operators of non-English hubs.
    pub locale: String,

    /// Minutes between feed-check ticks. Each tick fetches every approved,
    /// unsuspended blog, so this should stay coarse.
    pub feed_check_interval_minutes: u64,

    /// Minutes between announcement-dispatch ticks. One announcement leaves
    /// the queue per tick, so this interval throttles posting throughput.
    pub dispatch_interval_minutes: u64,

    /// Hard timeout for fetching a single feed.
    pub feed_fetch_timeout_secs: u64,

    /// Articles older than this are still ingested but never announced or
    /// fanned out.
    pub announce_recency_cutoff_hours: i64,

    /// Posts carrying any of these tags are never ingested.
    pub excluded_tags: Vec<String>,

    /// When non-empty, only posts carrying at least one of these tags are
    /// ingested.
    pub included_tags: Vec<String>,

    /// Tag spelling variants folded to a canonical form before club-tag
    /// comparison.
    pub tag_transforms: HashMap<String, String>,

    /// The tag marking posts that belong to the community reading club.
    pub club_tag: String,

    /// Hashtag appended to announcements of club posts.
    pub club_hashtag: String,

    pub tweet: ChannelConfig,
    pub toot: ChannelConfig,
    pub pocket: PocketConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Tidepool".to_string(),
            app_url: String::new(),
            database_path: "tidepool.db".to_string(),
            locale: "en".to_string(),
            feed_check_interval_minutes: 60,
            dispatch_interval_minutes: 5,
            feed_fetch_timeout_secs: 30,
            announce_recency_cutoff_hours: 48,
            excluded_tags: Vec::new(),
            included_tags: Vec::new(),
            tag_transforms: HashMap::new(),
            club_tag: String::new(),
            club_hashtag: String::new(),
            tweet: ChannelConfig {
                base_url: "https://api.twitter.com".to_string(),
                max_per_article: 3,
                hours_between: 10,
                ..ChannelConfig::default()
            },
            toot: ChannelConfig {
                max_per_article: 2,
                hours_between: 18,
                ..ChannelConfig::default()
            },
            pocket: PocketConfig::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn masked(token: &Option<String>) -> Option<&'static str> {
            token.as_ref().map(|_| "[REDACTED]")
        }

        f.debug_struct("Config")
            .field("app_name", &self.app_name)
            .field("app_url", &self.app_url)
            .field("database_path", &self.database_path)
            .field("locale", &self.locale)
            .field(
                "feed_check_interval_minutes",
                &self.feed_check_interval_minutes,
            )
            .field("dispatch_interval_minutes", &self.dispatch_interval_minutes)
            .field("feed_fetch_timeout_secs", &self.feed_fetch_timeout_secs)
            .field(
                "announce_recency_cutoff_hours",
                &self.announce_recency_cutoff_hours,
            )
            .field("excluded_tags", &self.excluded_tags)
            .field("included_tags", &self.included_tags)
            .field("tag_transforms", &self.tag_transforms)
            .field("club_tag", &self.club_tag)
            .field("club_hashtag", &self.club_hashtag)
            .field("tweet.enabled", &self.tweet.enabled)
            .field("tweet.access_token", &masked(&self.tweet.access_token))
            .field("toot.enabled", &self.toot.enabled)
            .field("toot.access_token", &masked(&self.toot.access_token))
            .field("pocket.enabled", &self.pocket.enabled)
            .field("pocket.consumer_key", &masked(&self.pocket.consumer_key))
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB), so a corrupted or hostile file
    /// is never read into memory.
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown top-level keys → accepted, logged as warning
    ///
    /// Token environment variables are applied after parsing.
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
                return Ok(Self::default().with_env_tokens());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default().with_env_tokens());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default().with_env_tokens());
        }

        // Parse as a raw table first to flag probable typos
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "app_name",
                "app_url",
                "database_path",
                "locale",
                "feed_check_interval_minutes",
                "dispatch_interval_minutes",
                "feed_fetch_timeout_secs",
                "announce_recency_cutoff_hours",
                "excluded_tags",
                "included_tags",
                "tag_transforms",
                "club_tag",
                "club_hashtag",
                "tweet",
                "toot",
                "pocket",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), app_name = %config.app_name, "Loaded configuration");
        Ok(config.with_env_tokens())
    }

    /// Environment variables override file-supplied credentials so tokens
    /// can be kept out of the config file entirely.
    fn with_env_tokens(mut self) -> Self {
        if let Ok(token) = std::env::var("TIDEPOOL_TWEET_TOKEN") {
            self.tweet.access_token = Some(token);
        }
        if let Ok(token) = std::env::var("TIDEPOOL_TOOT_TOKEN") {
            self.toot.access_token = Some(token);
        }
        if let Ok(key) = std::env::var("TIDEPOOL_POCKET_KEY") {
            self.pocket.consumer_key = Some(key);
        }
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
