//! Configuration - directories and container settings
//!
//! Read from `<config dir>/evidenceflow/config.yml`. Every field is
//! optional; command line flags override whatever the file says.

use crate::backend::BackendOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "evidenceflow";

/// Per-user application directory
pub fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of a named subdirectory (`plugins`, `scripts`, `dockerfiles`)
pub fn default_dir(name: &str) -> PathBuf {
    app_dir().join(name)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub plugin_dir: Option<PathBuf>,
    pub scripts_dir: Option<PathBuf>,
    pub max_parallel: Option<usize>,
    pub container: BackendOptions,
}

impl Config {
    /// Get the default config path
    pub fn default_path() -> PathBuf {
        app_dir().join("config.yml")
    }

    /// Load config from default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from specific path; a missing file means defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.plugin_dir
            .clone()
            .unwrap_or_else(|| default_dir("plugins"))
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.scripts_dir
            .clone()
            .unwrap_or_else(|| default_dir("scripts"))
    }
}
