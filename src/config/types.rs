//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use super::storage::ConfigError;
use crate::diag::{HealthThresholds, ReportFormat};
use crate::ssh::{AuthMethod, SshConfig};

/// Tool configuration, loaded once at startup and passed by reference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagConfig {
    /// Transport dialect tag
    pub device_type: String,

    /// Connect timeout in seconds
    pub timeout_secs: u64,

    /// SSH port
    pub port: u16,

    /// Per-command timeout in seconds
    pub command_timeout_secs: u64,

    /// Commands run when a diagnostic run names none
    pub diagnostic_commands: Vec<String>,

    pub report_format: ReportFormat,

    /// strftime pattern for bundle timestamps and report names
    pub timestamp_format: String,

    /// Directory for generated reports (current directory when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    pub strict_host_key_checking: bool,

    /// Sent once after login, before any diagnostic command
    pub session_setup_commands: Vec<String>,

    pub health: HealthThresholds,

    /// Inventory for batch runs
    pub devices: Vec<DeviceEntry>,
}

/// One inventory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub host: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
}

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub fn default_diagnostic_commands() -> Vec<String> {
    [
        "show version",
        "show ip interface brief",
        "show interfaces status",
        "show logging | last 50",
        "show processes cpu | exclude 0.00%__0.00%__0.00%",
        "show memory statistics",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            device_type: "cisco_ios".to_string(),
            timeout_secs: 30,
            port: 22,
            command_timeout_secs: 60,
            diagnostic_commands: default_diagnostic_commands(),
            report_format: ReportFormat::Text,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            output_dir: None,
            strict_host_key_checking: false,
            session_setup_commands: vec!["terminal length 0".to_string()],
            health: HealthThresholds::default(),
            devices: Vec::new(),
        }
    }
}

impl DiagConfig {
    /// Reject settings that would only fail later, mid-run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.diagnostic_commands.iter().all(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "diagnostic_commands must contain at least one command".to_string(),
            ));
        }
        if self.timeout_secs == 0 || self.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeout_secs and command_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.timestamp_format.is_empty()
            || StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error))
        {
            return Err(ConfigError::Invalid(format!(
                "invalid timestamp_format '{}'",
                self.timestamp_format
            )));
        }
        if let Some(entry) = self.devices.iter().find(|d| d.host.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "device entry for user '{}' has no host",
                entry.username
            )));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Connection parameters for `host`, with config-level defaults applied
    pub fn ssh_target(&self, host: &str, username: &str, auth: AuthMethod) -> SshConfig {
        SshConfig {
            host: host.to_string(),
            port: self.port,
            username: username.to_string(),
            auth,
            timeout_secs: self.timeout_secs,
            device_type: self.device_type.clone(),
            strict_host_key_checking: self.strict_host_key_checking,
        }
    }

    /// Connection parameters for an inventory entry; per-device port and
    /// dialect override the config-level ones
    pub fn entry_target(&self, entry: &DeviceEntry, auth: AuthMethod) -> SshConfig {
        let mut target = self.ssh_target(&entry.host, &entry.username, auth);
        if let Some(port) = entry.port {
            target.port = port;
        }
        if let Some(device_type) = &entry.device_type {
            target.device_type = device_type.clone();
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DiagConfig::default();
        assert_eq!(config.device_type, "cisco_ios");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.port, 22);
        assert_eq!(config.diagnostic_commands.len(), 6);
        assert_eq!(config.diagnostic_commands[0], "show version");
        assert_eq!(config.report_format, ReportFormat::Text);
        assert_eq!(config.timestamp_format, "%Y-%m-%d_%H-%M-%S");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: DiagConfig = serde_json::from_str(
            r#"{
                "timeout_secs": 10,
                "report_format": "json",
                "diagnostic_commands": ["show version", "show inventory"],
                "health": { "max_cpu_percent": 70 },
                "devices": [{ "host": "192.168.1.1", "username": "admin", "port": 2222 }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.port, 22);
        assert_eq!(config.report_format, ReportFormat::Json);
        assert_eq!(config.diagnostic_commands, vec!["show version", "show inventory"]);
        assert_eq!(config.health.max_cpu_percent, 70);
        assert_eq!(config.health.min_free_memory_bytes, 10_000_000);
        assert_eq!(config.devices[0].port, Some(2222));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let empty = DiagConfig {
            diagnostic_commands: vec!["  ".to_string()],
            ..Default::default()
        };
        assert!(matches!(empty.validate(), Err(ConfigError::Invalid(_))));

        let zero = DiagConfig {
            command_timeout_secs: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let bad_format = DiagConfig {
            timestamp_format: "%Y-%Q".to_string(),
            ..Default::default()
        };
        assert!(bad_format.validate().is_err());
    }

    #[test]
    fn test_entry_target_overrides() {
        let config = DiagConfig {
            timeout_secs: 15,
            ..Default::default()
        };
        let entry = DeviceEntry {
            host: "192.168.1.2".to_string(),
            username: "admin".to_string(),
            password: None,
            key_path: None,
            port: Some(2222),
            device_type: Some("cisco_xe".to_string()),
        };

        let target = config.entry_target(&entry, AuthMethod::password("pass2"));
        assert_eq!(target.host, "192.168.1.2");
        assert_eq!(target.port, 2222);
        assert_eq!(target.device_type, "cisco_xe");
        assert_eq!(target.timeout_secs, 15);
    }
}
