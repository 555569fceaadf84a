//! Device session: connection state, hostname and never-failing command execution

use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

use super::transport::{ConnectError, Connector, RemoteShell};
use crate::ssh::{SshConfig, SshError};

/// Text returned for commands issued without a connection
pub const NOT_CONNECTED: &str = "Error: Not connected to device";

/// Prefix of the text returned when a command could not be executed
pub const EXECUTION_ERROR_PREFIX: &str = "Error executing command: ";

/// Outcome of a single command. Never an error at the call site: every variant
/// has a text form suitable for reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// Raw device output
    Completed(String),
    /// The session was not connected
    NotConnected,
    /// The transport failed while executing the command
    Failed(String),
}

impl CommandOutput {
    /// True for `NotConnected` and `Failed`
    pub fn is_error(&self) -> bool {
        !matches!(self, CommandOutput::Completed(_))
    }

    pub fn into_text(self) -> String {
        match self {
            CommandOutput::Completed(text) => text,
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Completed(text) => f.write_str(text),
            CommandOutput::NotConnected => f.write_str(NOT_CONNECTED),
            CommandOutput::Failed(message) => write!(f, "{}{}", EXECUTION_ERROR_PREFIX, message),
        }
    }
}

/// One device, at most one open shell
pub struct DeviceSession<C: Connector> {
    connector: C,
    target: SshConfig,
    command_timeout: Duration,
    shell: Option<C::Shell>,
    hostname: Option<String>,
}

impl<C: Connector> DeviceSession<C> {
    pub fn new(connector: C, target: SshConfig, command_timeout: Duration) -> Self {
        Self {
            connector,
            target,
            command_timeout,
            shell: None,
            hostname: None,
        }
    }

    /// Device address as configured
    pub fn address(&self) -> &str {
        &self.target.host
    }

    /// Prompt-derived hostname; `None` until a successful connect
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.shell.is_some()
    }

    /// Open the session and resolve the hostname from the prompt.
    ///
    /// Returns the current hostname without reconnecting when already connected.
    pub async fn connect(&mut self) -> Result<String, ConnectError> {
        if let (Some(_), Some(hostname)) = (&self.shell, &self.hostname) {
            return Ok(hostname.clone());
        }

        info!("Connecting to {}...", self.target.host);
        let mut shell = match self.connector.connect(&self.target).await {
            Ok(shell) => shell,
            Err(e) => {
                warn!("{} ({})", e, self.target.host);
                return Err(e);
            }
        };

        let prompt = match shell.find_prompt().await {
            Ok(prompt) => prompt,
            Err(e) => {
                shell.disconnect().await;
                warn!("Could not read prompt from {}: {}", self.target.host, e);
                return Err(ConnectError::from(e));
            }
        };

        let hostname = hostname_from_prompt(&prompt);
        info!("Successfully connected to {}", hostname);

        self.shell = Some(shell);
        self.hostname = Some(hostname.clone());
        Ok(hostname)
    }

    /// Release the session. No-op when not connected.
    pub async fn disconnect(&mut self) {
        if let Some(mut shell) = self.shell.take() {
            shell.disconnect().await;
            info!(
                "Disconnected from {}",
                self.hostname.as_deref().unwrap_or(&self.target.host)
            );
        }
    }

    /// Run one command. Failures come back as [`CommandOutput`] variants.
    pub async fn run_command(&mut self, command: &str) -> CommandOutput {
        let Some(shell) = self.shell.as_mut() else {
            return CommandOutput::NotConnected;
        };

        debug!("Executing: {}", command);
        let limit = self.command_timeout;
        let result = tokio::time::timeout(limit, shell.send_command(command, limit))
            .await
            .unwrap_or_else(|_| {
                Err(SshError::Timeout(format!(
                    "No reply to '{}' after {} seconds",
                    command,
                    limit.as_secs_f32()
                )))
            });

        match result {
            Ok(output) => CommandOutput::Completed(output),
            Err(e) => {
                warn!("Command '{}' failed on {}: {}", command, self.target.host, e);
                CommandOutput::Failed(e.to_string())
            }
        }
    }

    /// Run `body` against the session, then disconnect whatever it returned.
    pub async fn scoped<T, F>(&mut self, body: F) -> T
    where
        F: for<'a> FnOnce(&'a mut Self) -> BoxFuture<'a, T>,
    {
        let out = body(self).await;
        self.disconnect().await;
        out
    }
}

/// The prompt minus its trailing delimiter (`router1#` → `router1`)
pub fn hostname_from_prompt(prompt: &str) -> String {
    let mut hostname = prompt.trim().to_string();
    hostname.pop();
    hostname
}
