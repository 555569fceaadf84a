//! SSH module - device connections over russh
//!
//! Provides the transport behind [`crate::diag::Connector`]:
//! - Password and private key authentication
//! - Host key verification via ~/.ssh/known_hosts
//! - A PTY shell channel with prompt-terminated command reads

mod client;
mod config;
mod error;
pub mod known_hosts;
mod shell;

pub use client::{ClientHandler, SshClient, SshConnector};
pub use config::{AuthMethod, SshConfig};
pub use error::SshError;
pub use known_hosts::{HostKeyVerification, KnownHostsStore};
pub use shell::{clean_command_output, is_prompt_line, SshShell};
