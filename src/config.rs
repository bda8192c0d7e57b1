//! Metric store configuration.
//!
//! Configuration is stored in TOML format at
//! `~/.config/node-metrics/config.toml` (or the platform equivalent).
//!
//! # Example Configuration
//!
//! ```toml
//! database_path = "/var/lib/node/metrics.db"
//! stat_log_frequency = 500
//! busy_timeout_ms = 2000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::stats::DEFAULT_STAT_LOG_FREQUENCY;

const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "metrics.db";

/// Errors that can occur when loading or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Settings for opening and running the metric store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Database file; defaults to `metrics.db` in the platform data dir.
    pub database_path: Option<PathBuf>,

    /// Increments between statistic log lines; 0 disables them.
    pub stat_log_frequency: u64,

    /// How long to wait on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            stat_log_frequency: DEFAULT_STAT_LOG_FREQUENCY,
            busy_timeout_ms: 5_000,
        }
    }
}

impl MetricsConfig {
    /// Load configuration from the default location.
    ///
    /// Returns the defaults if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the default configuration file path.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        project_dirs()
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// The configured database file, else `metrics.db` in the data dir.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.database_path
            && path.as_os_str().is_empty()
        {
            return Err(ConfigError::Validation(
                "database_path cannot be empty".into(),
            ));
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "busy_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("net", "node-metrics", "node-metrics")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = MetricsConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, MetricsConfig::default());
        assert_eq!(config.stat_log_frequency, 100);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "stat_log_frequency = 7\n").unwrap();
        let config = MetricsConfig::load_from(&path).unwrap();
        assert_eq!(config.stat_log_frequency, 7);
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = MetricsConfig {
            database_path: Some(dir.path().join("m.db")),
            stat_log_frequency: 0,
            busy_timeout_ms: 250,
        };
        config.save_to(&path).unwrap();
        assert_eq!(MetricsConfig::load_from(&path).unwrap(), config);
        assert_eq!(config.database_path().unwrap(), dir.path().join("m.db"));
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "busy_timeout_ms = 0\n").unwrap();
        assert!(matches!(
            MetricsConfig::load_from(&path),
            Err(ConfigError::Validation(_))
        ));

        std::fs::write(&path, "stat_log_frequency = \"often\"\n").unwrap();
        assert!(matches!(
            MetricsConfig::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
