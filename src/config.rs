//! Configuration file parser for ~/.config/suprss/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{RefreshSettings, DEFAULT_USER_AGENT};
use crate::util::HostPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level service configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. `None` means `~/.config/suprss/suprss.db`.
    pub database_path: Option<PathBuf>,

    /// Minutes between scheduled sweeps. 0 = no timer, manual sweeps only.
    pub refresh_interval_minutes: u64,

    /// Upper bound on one feed fetch, in seconds.
    pub fetch_timeout_secs: u64,

    /// User-Agent header sent with every fetch.
    pub user_agent: String,

    /// Feeds fetched in parallel during a sweep.
    pub max_concurrent_fetches: usize,

    /// Accept feed URLs pointing at loopback or private addresses.
    pub allow_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            refresh_interval_minutes: 10,
            fetch_timeout_secs: 12,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrent_fetches: 4,
            allow_private_hosts: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB)
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "database_path",
        "refresh_interval_minutes",
        "fetch_timeout_secs",
        "user_agent",
        "max_concurrent_fetches",
        "allow_private_hosts",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML or wrong value type → `Err(ConfigError::Parse)`
    /// - File over 1 MB → `Err(ConfigError::TooLarge)`
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
            // Deleted between metadata and read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text; blank text yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
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
            refresh_interval_minutes = config.refresh_interval_minutes,
            max_concurrent_fetches = config.max_concurrent_fetches,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Period of the scheduled sweep, `None` when the timer is disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.refresh_interval_minutes > 0)
            .then(|| Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60)))
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            max_concurrent_fetches: self.max_concurrent_fetches.max(1),
        }
    }

    pub fn host_policy(&self) -> HostPolicy {
        if self.allow_private_hosts {
            HostPolicy::AllowPrivate
        } else {
            HostPolicy::PublicOnly
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
