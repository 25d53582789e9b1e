//! Service configuration storage
//!
//! Remote endpoint, credentials, timeouts and editor limits, persisted as a
//! JSON file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use workflow_graph::Bounds;

const CONFIG_FILE: &str = "config.json";
const APP_DIR: &str = "visionflow";

/// Region the built-in Input/Output nodes are kept inside
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportConfig {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Extra room allowed outside the viewport on every side
    #[serde(default = "default_margin")]
    pub margin: f64,
}

fn default_margin() -> f64 {
    200.0
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1280.0,
            height: 800.0,
            margin: default_margin(),
        }
    }
}

impl ViewportConfig {
    pub fn bounds(&self) -> Bounds {
        Bounds::around_viewport(self.x, self.y, self.width, self.height, self.margin)
    }
}

/// Full service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the remote API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// API key sent with every request
    #[serde(default)]
    pub api_key: Option<String>,
    /// Workspace the workflows live in
    #[serde(default)]
    pub workspace: Option<String>,
    /// Client deadline for saving a graph
    #[serde(default = "default_save_timeout")]
    pub save_timeout_secs: u64,
    /// Per-request timeout for every other call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub viewport: ViewportConfig,
    /// Undo snapshots kept per editor
    #[serde(default = "default_undo_limit")]
    pub undo_limit: usize,
}

fn default_api_url() -> String {
    "http://localhost:9001".to_string()
}

fn default_save_timeout() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_undo_limit() -> usize {
    100
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            workspace: None,
            save_timeout_secs: default_save_timeout(),
            request_timeout_secs: default_request_timeout(),
            viewport: ViewportConfig::default(),
            undo_limit: default_undo_limit(),
        }
    }
}

impl ServiceConfig {
    /// Default config file location (`<config dir>/visionflow/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load configuration from `path`; a missing file yields defaults
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !fs::try_exists(path).await.map_err(ConfigError::Io)? {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).await.map_err(ConfigError::Io)?;

        let config: Self = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(ConfigError::Io)?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        fs::write(path, contents).await.map_err(ConfigError::Io)?;

        log::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Reject values no session can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_url must not be empty".to_string()));
        }
        if self.save_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".to_string()));
        }
        Ok(())
    }

    pub fn save_timeout(&self) -> Duration {
        Duration::from_secs(self.save_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
