//! Configuration for graphwatch.

use crate::CoreError;
use graphwatch_engine::WatchOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Watch session options
    #[serde(default)]
    pub watch: WatchOptions,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".graphwatch")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            watch: WatchOptions::default(),
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        default_config_dir().join("config.yaml")
    }

    /// Load configuration from the default file, falling back to defaults
    pub fn load() -> Self {
        let config_path = Self::default_path();

        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %config_path.display(), "Failed to load config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String, CoreError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
