//! Client Configuration
//!
//! Loaded from TOML or JSON (chosen by file extension). Every field has a
//! default, so an empty file or a missing one yields a usable setup.
//!
//! ```toml
//! api_url = "https://api.hopvpn.net/v4/servers.json"
//! fetch_timeout_secs = 10
//! store_path = "/var/lib/hop/servers.json"
//! protocol = "wireguard"
//! multi_hop = true
//! log_level = "debug"
//! ```

use crate::api::DEFAULT_API_URL;
use crate::model::Protocol;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported config format")]
    UnsupportedFormat,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopConfig {
    /// Server-list endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Deadline for one server-list fetch
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// JSON file holding the persisted catalog and selections
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Offline snapshot to use instead of the bundled one
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Protocol active at startup
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    #[serde(default)]
    pub multi_hop: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_store_path() -> PathBuf {
    PathBuf::from("hop-servers.json")
}

fn default_protocol() -> Protocol {
    Protocol::WireGuard
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for HopConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            fetch_timeout_secs: default_fetch_timeout(),
            store_path: default_store_path(),
            snapshot_path: None,
            protocol: default_protocol(),
            multi_hop: false,
            log_level: default_log_level(),
        }
    }
}

impl HopConfig {
    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load from JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load from a `.toml` or `.json` file; a missing file gives defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config = match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "toml" => Self::from_toml(&content)?,
            "json" => Self::from_json(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_url is empty".into()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Export as TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
