//! Remote session capability consumed by the diagnostic pipeline

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::ssh::{SshConfig, SshError};

/// Connect-phase failures; fatal to the session being opened
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Transport(String),
}

impl From<SshError> for ConnectError {
    fn from(err: SshError) -> Self {
        match err {
            SshError::AuthenticationFailed(msg) => ConnectError::Auth(msg),
            SshError::KeyError(msg) => ConnectError::Auth(format!("Key error: {}", msg)),
            SshError::Timeout(msg) => ConnectError::Timeout(msg),
            other => ConnectError::Transport(other.to_string()),
        }
    }
}

/// An open, authenticated shell on one device
#[async_trait]
pub trait RemoteShell: Send {
    /// The device's current prompt, e.g. `router1#`
    async fn find_prompt(&mut self) -> Result<String, SshError>;

    /// Send one command and return its raw text reply
    async fn send_command(&mut self, command: &str, timeout: Duration) -> Result<String, SshError>;

    /// Release the session; errors are logged, not returned
    async fn disconnect(&mut self);
}

/// Opens [`RemoteShell`]s
#[async_trait]
pub trait Connector: Send + Sync {
    type Shell: RemoteShell;

    async fn connect(&self, target: &SshConfig) -> Result<Self::Shell, ConnectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_error_mapping() {
        assert_eq!(
            ConnectError::from(SshError::AuthenticationFailed("rejected".into())),
            ConnectError::Auth("rejected".into())
        );
        assert_eq!(
            ConnectError::from(SshError::Timeout("10.0.0.1:22".into())),
            ConnectError::Timeout("10.0.0.1:22".into())
        );
        assert_eq!(
            ConnectError::from(SshError::ConnectionFailed("refused".into())),
            ConnectError::Transport("Connection failed: refused".into())
        );
        assert!(matches!(
            ConnectError::from(SshError::KeyError("bad passphrase".into())),
            ConnectError::Auth(_)
        ));
    }
}
