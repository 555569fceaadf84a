//! SSH Configuration

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection parameters for a single device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Device address (IP or DNS name)
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Authentication method
    pub auth: AuthMethod,

    /// Connection timeout in seconds, covering handshake, authentication
    /// and the first prompt
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Transport dialect tag, e.g. `cisco_ios`
    #[serde(default = "default_device_type")]
    pub device_type: String,

    /// Strict host key checking
    /// - true: reject hosts missing from known_hosts
    /// - false: accept and record unknown hosts, still reject changed keys
    #[serde(default)]
    pub strict_host_key_checking: bool,
}

/// Authentication methods supported
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Password authentication
    Password { password: String },

    /// SSH key authentication
    Key {
        /// Path to private key file
        key_path: String,
        /// Optional passphrase for encrypted keys
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    pub fn key(key_path: impl Into<String>, passphrase: Option<String>) -> Self {
        Self::Key {
            key_path: key_path.into(),
            passphrase,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password { .. } => f.write_str("Password(***)"),
            AuthMethod::Key { key_path, .. } => write!(f, "Key({})", key_path),
        }
    }
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    30
}

fn default_device_type() -> String {
    "cisco_ios".to_string()
}

impl SshConfig {
    /// `host:port`, as used in log lines and socket resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            auth: AuthMethod::Password {
                password: String::new(),
            },
            timeout_secs: default_timeout(),
            device_type: default_device_type(),
            strict_host_key_checking: false,
        }
    }
}
