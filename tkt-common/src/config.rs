//! Configuration loading and config file resolution
//!
//! Priority order for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Tiers 1 and 2 are handled by the binaries through clap; this module owns
//! tiers 3 and 4. A missing config file is never fatal.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Default poll interval (10 seconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Default bound on a single remote datafile fetch
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;

/// CDN template used when only an SDK key is configured
const DATAFILE_CDN_TEMPLATE: &str = "https://cdn.optimizely.com/datafiles/{sdk_key}.json";

/// How the datafile is kept fresh
///
/// Fixed at startup. Exactly one strategy is active per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncModeSetting {
    /// Recurring timer fetches the datafile
    #[default]
    Polling,
    /// Inbound webhook calls trigger a one-shot fetch
    #[serde(alias = "webhook_driven")]
    Webhook,
}

impl SyncModeSetting {
    /// Parse a mode name (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "polling" | "poll" => Some(SyncModeSetting::Polling),
            "webhook" | "webhook_driven" | "push" => Some(SyncModeSetting::Webhook),
            _ => None,
        }
    }
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// `[sync]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub mode: SyncModeSetting,
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    /// Explicit datafile URL (takes precedence over `sdk_key`)
    pub datafile_url: Option<String>,
    /// SDK key used to derive the CDN datafile URL
    pub sdk_key: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: SyncModeSetting::Polling,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            datafile_url: None,
            sdk_key: None,
        }
    }
}

impl SyncSettings {
    /// Resolved datafile URL, if any source is configured
    pub fn datafile_url(&self) -> Option<String> {
        if let Some(url) = self.datafile_url.as_ref().filter(|u| !u.trim().is_empty()) {
            return Some(url.trim().to_string());
        }
        self.sdk_key
            .as_ref()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| DATAFILE_CDN_TEMPLATE.replace("{sdk_key}", k))
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero interval would spin the timer
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.max(1))
    }
}

/// `[attributes]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeSettings {
    /// Location attribute reported for every user
    pub default_location: String,
}

impl Default for AttributeSettings {
    fn default() -> Self {
        Self {
            default_location: "US".to_string(),
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive (e.g. "info", "tkt_xp=debug")
    pub level: Option<String>,
}

/// Full TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub sync: SyncSettings,
    pub attributes: AttributeSettings,
    pub logging: LoggingConfig,
}

/// Resolve the config file path
///
/// Priority: explicit argument (CLI or ENV via clap) → platform config dir
/// (`<config dir>/tkt/<module>.toml`). Returns `None` when no platform
/// directory can be determined.
pub fn resolve_config_path(explicit: Option<&Path>, module_name: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    dirs::config_dir().map(|d| d.join("tkt").join(format!("{}.toml", module_name)))
}

/// Load TOML configuration with graceful degradation
///
/// A missing file yields defaults and a warning. A file that exists but
/// cannot be read or parsed is a configuration error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        warn!("No config file location available, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file not found at {}, using compiled defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = parse_toml_config(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse TOML text into a config (missing keys take defaults)
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sync.mode, SyncModeSetting::Polling);
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.sync.fetch_timeout(), Duration::from_secs(5));
        assert!(config.sync.datafile_url().is_none());
    }

    #[test]
    fn test_datafile_url_from_sdk_key() {
        let sync = SyncSettings {
            sdk_key: Some("abc123".to_string()),
            ..Default::default()
        };
        assert_eq!(
            sync.datafile_url().as_deref(),
            Some("https://cdn.optimizely.com/datafiles/abc123.json")
        );
    }

    #[test]
    fn test_explicit_url_wins_over_sdk_key() {
        let sync = SyncSettings {
            sdk_key: Some("abc123".to_string()),
            datafile_url: Some("http://localhost:9000/datafile.json".to_string()),
            ..Default::default()
        };
        assert_eq!(
            sync.datafile_url().as_deref(),
            Some("http://localhost:9000/datafile.json")
        );
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(SyncModeSetting::from_str("Polling"), Some(SyncModeSetting::Polling));
        assert_eq!(SyncModeSetting::from_str("webhook"), Some(SyncModeSetting::Webhook));
        assert_eq!(SyncModeSetting::from_str("sometimes"), None);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let sync = SyncSettings {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(sync.poll_interval(), Duration::from_millis(100));
    }
}
