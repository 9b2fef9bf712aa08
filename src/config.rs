//! Configuration management for the meetcast host

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::host::DEFAULT_MAX_INBOUND_BYTES;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where recordings and settings are kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote recordings API
    #[serde(default)]
    pub api: ApiConfig,

    /// Capture surface configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Native port configuration
    #[serde(default)]
    pub host: HostConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory override; defaults to the platform data dir
    pub data_dir: Option<PathBuf>,

    /// Synced recordings kept in the listing
    #[serde(default = "default_max_recordings")]
    pub max_recordings: usize,

    /// Local recordings (with media) kept while pending sync
    #[serde(default = "default_max_local_recordings")]
    pub max_local_recordings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the recordings service
    pub base_url: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// How long to wait for the offscreen document to come up (ms)
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Largest frame accepted from the extension (bytes)
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

// Default value functions
fn default_max_recordings() -> usize {
    100
}

fn default_max_local_recordings() -> usize {
    10 // local records carry their media
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_ready_timeout_ms() -> u64 {
    5_000
}

fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_INBOUND_BYTES
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_recordings: default_max_recordings(),
            max_local_recordings: default_max_local_recordings(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "meetcast", "host")
        .context("Failed to determine project directories")
}

impl Config {
    /// Load configuration from the default location, creating it on first run
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path()?)
    }

    /// Load configuration from `path`, creating a default file if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;

            config.config_path = Some(path.to_path_buf());
            Ok(config)
        } else {
            let config = Config {
                config_path: Some(path.to_path_buf()),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory holding the recordings store
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().join("store")),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.max(1))
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.capture.ready_timeout_ms)
    }
}
