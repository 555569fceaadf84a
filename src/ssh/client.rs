//! SSH Client implementation using russh

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PublicKey;
use russh::*;
use tracing::{debug, info, warn};

use super::config::{AuthMethod, SshConfig};
use super::error::SshError;
use super::known_hosts::{HostKeyVerification, KnownHostsStore};
use super::shell::SshShell;
use crate::diag::{ConnectError, Connector};

/// Opens one authenticated shell session against a device
pub struct SshClient {
    config: SshConfig,
    known_hosts: Arc<KnownHostsStore>,
    setup_commands: Vec<String>,
}

impl SshClient {
    pub fn new(config: SshConfig, known_hosts: Arc<KnownHostsStore>) -> Self {
        Self {
            config,
            known_hosts,
            setup_commands: Vec::new(),
        }
    }

    /// Commands sent once the first prompt is seen (e.g. `terminal length 0`)
    pub fn with_setup_commands(mut self, commands: Vec<String>) -> Self {
        self.setup_commands = commands;
        self
    }

    /// Connect, authenticate and open the shell; the whole sequence is bounded
    /// by the configured timeout.
    pub async fn connect(self) -> Result<SshShell, SshError> {
        let limit = Duration::from_secs(self.config.timeout_secs);
        let address = self.config.address();

        tokio::time::timeout(limit, self.establish())
            .await
            .map_err(|_| SshError::Timeout(format!("Connection to {} timed out", address)))?
    }

    async fn establish(self) -> Result<SshShell, SshError> {
        let addr = self.config.address();
        info!(
            "Connecting to {} ({}) as {}",
            addr, self.config.device_type, self.config.username
        );

        let socket_addr = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| SshError::ConnectionFailed(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SshError::ConnectionFailed("No address found".to_string()))?;

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler::new(
            self.config.host.clone(),
            self.config.port,
            self.config.strict_host_key_checking,
            self.known_hosts.clone(),
        );

        let mut handle = client::connect(Arc::new(ssh_config), socket_addr, handler)
            .await
            .map_err(|e| SshError::ConnectionFailed(e.to_string()))?;

        debug!("SSH handshake completed with {}", addr);

        let authenticated = match &self.config.auth {
            AuthMethod::Password { password } => handle
                .authenticate_password(&self.config.username, password)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?,
            AuthMethod::Key {
                key_path,
                passphrase,
            } => {
                let key = russh::keys::load_secret_key(expand_tilde(key_path), passphrase.as_deref())
                    .map_err(|e| SshError::KeyError(e.to_string()))?;
                let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);

                handle
                    .authenticate_publickey(&self.config.username, key_with_hash)
                    .await
                    .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
            }
        };

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by device".to_string(),
            ));
        }

        info!("SSH authentication successful for {}", addr);

        SshShell::open(
            handle,
            &self.setup_commands,
            Duration::from_secs(self.config.timeout_secs),
        )
        .await
    }
}

/// `~/...` → absolute path under the home directory
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

/// Client handler for russh callbacks: host key verification against known_hosts
pub struct ClientHandler {
    host: String,
    port: u16,
    /// - true: reject unknown keys
    /// - false: record unknown keys (changed keys are always rejected)
    strict: bool,
    known_hosts: Arc<KnownHostsStore>,
}

impl ClientHandler {
    pub fn new(host: String, port: u16, strict: bool, known_hosts: Arc<KnownHostsStore>) -> Self {
        Self {
            host,
            port,
            strict,
            known_hosts,
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.known_hosts.verify(&self.host, self.port, server_public_key) {
            HostKeyVerification::Verified => {
                debug!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            HostKeyVerification::Unknown { fingerprint } if self.strict => {
                warn!(
                    "Unknown host key for {}:{} ({}), strict checking enabled",
                    self.host, self.port, fingerprint
                );
                Err(SshError::ConnectionFailed(format!(
                    "Host key verification failed: unknown host {}:{}. Fingerprint: {}",
                    self.host, self.port, fingerprint
                )))
            }
            HostKeyVerification::Unknown { fingerprint } => {
                info!(
                    "New device {}:{}, recording host key ({})",
                    self.host, self.port, fingerprint
                );
                if let Err(e) = self
                    .known_hosts
                    .add_host(&self.host, self.port, server_public_key)
                {
                    warn!("Failed to save host key: {}", e);
                }
                Ok(true)
            }
            HostKeyVerification::Changed {
                expected_fingerprint,
                actual_fingerprint,
            } => {
                warn!(
                    "HOST KEY CHANGED for {}:{}! Expected {}, got {}",
                    self.host, self.port, expected_fingerprint, actual_fingerprint
                );
                Err(SshError::ConnectionFailed(format!(
                    "Host key for {}:{} has changed (expected {}, got {}). \
                     Remove the old entry from known_hosts if the change is legitimate",
                    self.host, self.port, expected_fingerprint, actual_fingerprint
                )))
            }
        }
    }
}

/// [`Connector`] backed by russh
pub struct SshConnector {
    known_hosts: Arc<KnownHostsStore>,
    setup_commands: Vec<String>,
}

impl SshConnector {
    pub fn new(known_hosts: Arc<KnownHostsStore>, setup_commands: Vec<String>) -> Self {
        Self {
            known_hosts,
            setup_commands,
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Shell = SshShell;

    async fn connect(&self, target: &SshConfig) -> Result<SshShell, ConnectError> {
        SshClient::new(target.clone(), self.known_hosts.clone())
            .with_setup_commands(self.setup_commands.clone())
            .connect()
            .await
            .map_err(ConnectError::from)
    }
}
