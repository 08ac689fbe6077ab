//! Runtime configuration: directory roots and stage executable paths.
//!
//! Configuration is an optional YAML file, `harvest.yaml` by default and
//! overridable with `--config` or `HARVEST_CONFIG`. A file named
//! explicitly must exist and parse; the default file is allowed to be
//! absent, in which case the built-in defaults apply. Partial files work,
//! unnamed fields keep their defaults.
//!
//! ```yaml
//! news_dir: news
//! articles_dir: articles
//! stages:
//!   geolocation: tools/location-analyse
//!   situation: tools/things-analyse
//!   background: tools/background-analyse
//!   visualization: tools/visualization
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::scheduler::Stage;

/// Config file looked for when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "harvest.yaml";

/// Executable path for each analysis stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StagePaths {
    pub geolocation: PathBuf,
    pub situation: PathBuf,
    pub background: PathBuf,
    pub visualization: PathBuf,
}

impl Default for StagePaths {
    fn default() -> Self {
        Self {
            geolocation: PathBuf::from("tools/location-analyse"),
            situation: PathBuf::from("tools/things-analyse"),
            background: PathBuf::from("tools/background-analyse"),
            visualization: PathBuf::from("tools/visualization"),
        }
    }
}

impl StagePaths {
    /// The configured executable for one stage.
    pub fn path_for(&self, stage: Stage) -> &PathBuf {
        match stage {
            Stage::Geolocation => &self.geolocation,
            Stage::Situation => &self.situation,
            Stage::Background => &self.background,
            Stage::Visualization => &self.visualization,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where per-(keyword, source) crawl artifacts land.
    pub news_dir: PathBuf,
    /// Where per-article bundles land.
    pub articles_dir: PathBuf,
    pub stages: StagePaths,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            news_dir: PathBuf::from("news"),
            articles_dir: PathBuf::from("articles"),
            stages: StagePaths::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration, preferring an explicitly named file.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    debug!("No config file; using built-in defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}
