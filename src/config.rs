//! Application configuration management.
//!
//! Loads and saves application-wide settings: database location, scan
//! worker count, large-file threshold, purge grace period, and the
//! metadata sync endpoint.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite file store. `None` uses the platform data dir.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Worker threads for parallel fingerprinting.
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,

    /// Flat large-file threshold in bytes.
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,

    /// Days a soft-deleted record survives before it is purge-eligible.
    #[serde(default = "default_purge_grace_days")]
    pub purge_grace_days: u32,

    /// Remote endpoint for metadata sync. `None` disables sync.
    #[serde(default)]
    pub sync_endpoint: Option<String>,
}

fn default_io_threads() -> usize {
    4
}

fn default_large_file_threshold() -> u64 {
    crate::stats::DEFAULT_LARGE_FILE_THRESHOLD
}

fn default_purge_grace_days() -> u32 {
    7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            io_threads: default_io_threads(),
            large_file_threshold: default_large_file_threshold(),
            purge_grace_days: default_purge_grace_days(),
            sync_endpoint: None,
        }
    }
}

impl Config {
    /// Load the configuration from the default platform-specific path.
    pub fn load() -> Self {
        match Self::load_internal() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn load_internal() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save the configuration to the default platform-specific path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the file store path: explicit config value, or the
    /// platform data directory.
    pub fn resolve_database_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.database_path {
            return Ok(path.clone());
        }
        let project_dirs = Self::project_dirs()?;
        Ok(project_dirs.data_dir().join("purescan.db"))
    }

    /// Get the default platform-specific configuration path.
    fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.json"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "purescan", "purescan")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.io_threads, 4);
        assert_eq!(config.large_file_threshold, 50 * 1024 * 1024);
        assert_eq!(config.purge_grace_days, 7);
        assert!(config.database_path.is_none());
        assert!(config.sync_endpoint.is_none());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"io_threads": 8}"#).unwrap();
        assert_eq!(config.io_threads, 8);
        assert_eq!(config.purge_grace_days, 7);
    }

    #[test]
    fn test_round_trip() {
        let mut config = Config::default();
        config.sync_endpoint = Some("https://example.com/sync".to_string());
        config.database_path = Some(PathBuf::from("/tmp/test.db"));

        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sync_endpoint.as_deref(), Some("https://example.com/sync"));
        assert_eq!(back.database_path, config.database_path);
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let mut config = Config::default();
        config.database_path = Some(PathBuf::from("/tmp/custom.db"));
        assert_eq!(
            config.resolve_database_path().unwrap(),
            PathBuf::from("/tmp/custom.db")
        );
    }
}
