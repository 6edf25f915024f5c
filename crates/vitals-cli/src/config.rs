//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use vitals_core::ClientConfig;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default device identifier for `watch`
    #[serde(default)]
    pub device: Option<String>,

    /// Advertised-name substring identifying sensors
    #[serde(default)]
    pub name_filter: Option<String>,

    /// Scan window in seconds
    #[serde(default)]
    pub scan_secs: Option<u64>,

    /// Connection timeout in seconds
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Log filter used when `RUST_LOG` is unset (e.g. "info", "vitals_core=debug")
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("radar-vitals")
            .join("config.toml")
    }

    /// Load config from the default location, or return defaults if the file
    /// is missing or unreadable.
    pub fn load() -> Self {
        let path = Self::path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load config from an explicit path. A missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to a path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Build the client configuration, letting command-line values win over
    /// the file.
    pub fn client_config(
        &self,
        name_filter: Option<&str>,
        scan_secs: Option<u64>,
        connect_timeout_secs: Option<u64>,
    ) -> ClientConfig {
        let mut config = ClientConfig::default();

        if let Some(filter) = name_filter.or(self.name_filter.as_deref()) {
            config = config.name_filter(filter);
        }
        if let Some(secs) = scan_secs.or(self.scan_secs) {
            config = config.scan_duration(Duration::from_secs(secs));
        }
        if let Some(secs) = connect_timeout_secs.or(self.connect_timeout_secs) {
            config = config.connect_timeout(Duration::from_secs(secs));
        }
        config
    }
}

/// Resolve device from arg or config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device
        .filter(|d| !d.is_empty())
        .or_else(|| config.device.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_device_prefers_arg() {
        let config = Config {
            device: Some("from-config".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_device(Some("from-arg".into()), &config).as_deref(),
            Some("from-arg")
        );
    }

    #[test]
    fn test_resolve_device_falls_back_to_config() {
        let config = Config {
            device: Some("from-config".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_device(None, &config).as_deref(),
            Some("from-config")
        );
        assert_eq!(
            resolve_device(Some(String::new()), &config).as_deref(),
            Some("from-config")
        );
        assert!(resolve_device(None, &Config::default()).is_none());
    }

    #[test]
    fn test_client_config_precedence() {
        let config = Config {
            name_filter: Some("Radar".into()),
            scan_secs: Some(20),
            connect_timeout_secs: Some(30),
            ..Default::default()
        };

        let client = config.client_config(None, Some(5), None);
        assert_eq!(client.name_filter, "Radar");
        assert_eq!(client.scan_duration, Duration::from_secs(5));
        assert_eq!(client.connect_timeout, Duration::from_secs(30));

        let client = Config::default().client_config(Some("Sensor"), None, None);
        assert_eq!(client.name_filter, "Sensor");
        assert_eq!(client.scan_duration, ClientConfig::default().scan_duration);
    }

    #[test]
    fn test_load_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            device: Some("AA:BB:CC:DD:EE:FF".into()),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "scan_secs = 15\nname_filter = \"MR60\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.scan_secs, Some(15));
        assert_eq!(config.name_filter.as_deref(), Some("MR60"));
        assert!(config.device.is_none());
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_default_path_location() {
        let path = Config::path();
        assert!(path.ends_with("radar-vitals/config.toml"));
    }
}
