//! Diagnostic runner: one ordered command batch → one timestamped bundle

use std::fmt::Write;

use chrono::{DateTime, Local};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::session::DeviceSession;
use super::transport::{ConnectError, Connector};
use crate::config::{DiagConfig, DEFAULT_TIMESTAMP_FORMAT};

/// Session setup failed before any command could run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticError {
    #[error("Failed to connect to device")]
    ConnectFailed(#[source] ConnectError),
}

/// Raw outputs of one diagnostic run, keyed by the literal command string in
/// the order the commands were first issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticBundle {
    device: String,
    hostname: String,
    timestamp: String,
    diagnostics: IndexMap<String, String>,
}

impl DiagnosticBundle {
    pub fn new(
        device: impl Into<String>,
        hostname: impl Into<String>,
        timestamp: impl Into<String>,
        diagnostics: IndexMap<String, String>,
    ) -> Self {
        Self {
            device: device.into(),
            hostname: hostname.into(),
            timestamp: timestamp.into(),
            diagnostics,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn diagnostics(&self) -> &IndexMap<String, String> {
        &self.diagnostics
    }

    /// Output recorded for `command`, if it was run
    pub fn output(&self, command: &str) -> Option<&str> {
        self.diagnostics.get(command).map(String::as_str)
    }
}

/// Drives a [`DeviceSession`] through a command list
#[derive(Debug, Clone)]
pub struct DiagnosticRunner {
    default_commands: Vec<String>,
    timestamp_format: String,
}

impl DiagnosticRunner {
    pub fn new(config: &DiagConfig) -> Self {
        Self {
            default_commands: config.diagnostic_commands.clone(),
            timestamp_format: config.timestamp_format.clone(),
        }
    }

    /// Run `commands` (or the configured defaults when none or an empty list is
    /// given), connecting first if needed.
    ///
    /// A repeated command keeps its first position and its last output.
    pub async fn run_diagnostics<C: Connector>(
        &self,
        session: &mut DeviceSession<C>,
        commands: Option<&[String]>,
    ) -> Result<DiagnosticBundle, DiagnosticError> {
        let hostname = session
            .connect()
            .await
            .map_err(DiagnosticError::ConnectFailed)?;

        let commands = match commands {
            Some(list) if !list.is_empty() => list,
            _ => self.default_commands.as_slice(),
        };
        let timestamp = format_timestamp(Local::now(), &self.timestamp_format);

        info!("Running diagnostics on {}...", hostname);
        let mut diagnostics = IndexMap::with_capacity(commands.len());
        for command in commands {
            info!("  Executing: {}", command);
            let output = session.run_command(command).await;
            diagnostics.insert(command.clone(), output.into_text());
        }

        Ok(DiagnosticBundle::new(
            session.address(),
            hostname,
            timestamp,
            diagnostics,
        ))
    }
}

/// `now` in `pattern`, or in the default pattern when `pattern` is invalid
fn format_timestamp(now: DateTime<Local>, pattern: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", now.format(pattern)).is_ok() {
        return out;
    }

    warn!("Invalid timestamp format '{}', using default", pattern);
    out.clear();
    let _ = write!(out, "{}", now.format(DEFAULT_TIMESTAMP_FORMAT));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::testing::ScriptedConnector;

    fn runner() -> DiagnosticRunner {
        DiagnosticRunner::new(&DiagConfig::default())
    }

    #[tokio::test]
    async fn test_default_commands_in_order() {
        let connector = ScriptedConnector::new("r1#").reply("show version", "Cisco IOS XE");
        let log = connector.log();
        let mut session = connector.session();

        let bundle = runner().run_diagnostics(&mut session, None).await.unwrap();

        let defaults = DiagConfig::default().diagnostic_commands;
        let keys: Vec<&String> = bundle.diagnostics().keys().collect();
        assert_eq!(keys, defaults.iter().collect::<Vec<_>>());
        assert_eq!(log.lock().commands, defaults);
        assert_eq!(bundle.output("show version"), Some("Cisco IOS XE"));
        assert_eq!(bundle.device(), "10.0.0.1");
        assert_eq!(bundle.hostname(), "r1");
    }

    #[tokio::test]
    async fn test_empty_list_uses_defaults() {
        let mut session = ScriptedConnector::new("r1#").session();
        let bundle = runner()
            .run_diagnostics(&mut session, Some(&[]))
            .await
            .unwrap();
        assert_eq!(
            bundle.diagnostics().len(),
            DiagConfig::default().diagnostic_commands.len()
        );
    }

    #[tokio::test]
    async fn test_duplicate_commands_keep_last_output() {
        // Accepted behaviour: the key is the command string, so a repeat
        // overwrites the earlier result.
        let connector = ScriptedConnector::new("r1#")
            .reply("show clock", "10:00:00")
            .reply("show clock", "10:00:05")
            .reply("show version", "IOS");
        let log = connector.log();
        let mut session = connector.session();

        let commands: Vec<String> = ["show clock", "show version", "show clock"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let bundle = runner()
            .run_diagnostics(&mut session, Some(&commands))
            .await
            .unwrap();

        assert_eq!(log.lock().commands.len(), 3);
        assert_eq!(bundle.diagnostics().len(), 2);
        assert_eq!(bundle.output("show clock"), Some("10:00:05"));
        let keys: Vec<&str> = bundle.diagnostics().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["show clock", "show version"]);
    }

    #[tokio::test]
    async fn test_failed_command_does_not_abort_batch() {
        let connector = ScriptedConnector::new("r1#")
            .fail("show environment all", "channel closed")
            .reply("show inventory", "PID: C9300-48P");
        let mut session = connector.session();

        let commands = vec![
            "show environment all".to_string(),
            "show inventory".to_string(),
        ];
        let bundle = runner()
            .run_diagnostics(&mut session, Some(&commands))
            .await
            .unwrap();

        assert_eq!(
            bundle.output("show environment all"),
            Some("Error executing command: Channel error: channel closed")
        );
        assert_eq!(bundle.output("show inventory"), Some("PID: C9300-48P"));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let connector = ScriptedConnector::new("r1#")
            .refuse(ConnectError::Timeout("10.0.0.1:22".into()));
        let mut session = connector.session();

        let err = runner().run_diagnostics(&mut session, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to connect to device");
        assert!(matches!(
            err,
            DiagnosticError::ConnectFailed(ConnectError::Timeout(_))
        ));
    }

    #[test]
    fn test_invalid_timestamp_format_falls_back() {
        let now = Local::now();
        assert_eq!(
            format_timestamp(now, "%Y-%Q"),
            now.format(DEFAULT_TIMESTAMP_FORMAT).to_string()
        );
        assert_eq!(format_timestamp(now, "%Y"), now.format("%Y").to_string());
    }

    #[tokio::test]
    async fn test_unvalidated_config_does_not_panic() {
        let config = DiagConfig {
            timestamp_format: "%Q".to_string(),
            ..Default::default()
        };
        let mut session = ScriptedConnector::new("r1#").session();

        let bundle = DiagnosticRunner::new(&config)
            .run_diagnostics(&mut session, None)
            .await
            .unwrap();
        assert_eq!(bundle.timestamp().len(), "2026-10-19_08-30-00".len());
    }

    #[tokio::test]
    async fn test_timestamp_uses_configured_format() {
        let config = DiagConfig {
            timestamp_format: "%Y".to_string(),
            ..Default::default()
        };
        let mut session = ScriptedConnector::new("r1#").session();

        let bundle = DiagnosticRunner::new(&config)
            .run_diagnostics(&mut session, None)
            .await
            .unwrap();
        assert_eq!(bundle.timestamp().len(), 4);
        assert!(bundle.timestamp().chars().all(|c| c.is_ascii_digit()));
    }
}
