//! Configuration Storage
//!
//! Reads and writes the JSON config file.
//! Config location: ~/.netdiag/config.json

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::types::DiagConfig;

/// Configuration storage errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// `~/.netdiag`
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".netdiag"))
        .ok_or(ConfigError::NoConfigDir)
}

pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json"))
}

pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    /// Storage at the default location
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            path: config_file()?,
        })
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the config.
    /// A missing file yields the defaults; a malformed one is an error.
    pub async fn load(&self) -> Result<DiagConfig, ConfigError> {
        let config = match fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str::<DiagConfig>(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", self.path);
                DiagConfig::default()
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk
    pub async fn save(&self, config: &DiagConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        // Write to temp file first, then rename
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(config)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceEntry;
    use crate::diag::ReportFormat;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_returns_defaults() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join("config.json"));

        assert!(!storage.exists().await);
        let config = storage.load().await.unwrap();
        assert_eq!(config.port, 22);
        assert_eq!(config.diagnostic_commands.len(), 6);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = tempdir().unwrap();
        let storage = ConfigStorage::with_path(temp.path().join("nested").join("config.json"));

        let mut config = DiagConfig::default();
        config.report_format = ReportFormat::Json;
        config.devices.push(DeviceEntry {
            host: "192.168.1.1".to_string(),
            username: "admin".to_string(),
            password: None,
            key_path: Some("~/.ssh/id_ed25519".to_string()),
            port: None,
            device_type: None,
        });

        storage.save(&config).await.unwrap();
        assert!(storage.exists().await);

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded.report_format, ReportFormat::Json);
        assert_eq!(loaded.devices.len(), 1);
        assert_eq!(
            loaded.devices[0].key_path.as_deref(),
            Some("~/.ssh/id_ed25519")
        );
    }

    #[tokio::test]
    async fn test_load_malformed_is_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ConfigStorage::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_values() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{ "diagnostic_commands": [] }"#).unwrap();

        let err = ConfigStorage::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
