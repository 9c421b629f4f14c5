//! Taskpacer configuration types and loading

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::poll::PollingConfig;
use crate::scheduler::SchedulerConfig;

/// Main Taskpacer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when none is given on the command line
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Token bucket and fairness settings
    pub scheduler: SchedulerConfig,

    /// Poll loop defaults
    pub polling: PollingConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().wrap_err("Invalid scheduler section")?;
        if let Some(level) = &self.log_level {
            level
                .parse::<tracing::Level>()
                .map_err(|_| eyre::eyre!("Unknown log-level: {}", level))?;
        }
        Ok(())
    }

    /// Load configuration
    ///
    /// An explicit path must load. Otherwise the first readable file among
    /// `./.taskpacer.yml` and `<config_dir>/taskpacer/taskpacer.yml` wins, and
    /// defaults apply when neither exists.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(path).wrap_err_with(|| format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!(path = %candidate.display(), error = %e, "Skipping unreadable config"),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".taskpacer.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("taskpacer").join("taskpacer.yml"));
        }
        paths
    }

    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).wrap_err("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).wrap_err("Failed to parse config file")?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}
