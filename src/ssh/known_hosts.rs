//! Known hosts file handling for device host key verification

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::RwLock;
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::error::SshError;

/// Result of host key verification
#[derive(Debug, Clone, PartialEq)]
pub enum HostKeyVerification {
    /// Key matches a known_hosts entry
    Verified,
    /// Host (or this key type for the host) is not recorded yet
    Unknown { fingerprint: String },
    /// Recorded key differs from the one presented
    Changed {
        expected_fingerprint: String,
        actual_fingerprint: String,
    },
}

#[derive(Clone, Debug)]
struct HostKeyEntry {
    key_type: String,
    key_data: String,
}

/// In-memory view of a known_hosts file, appended to as new devices are accepted
pub struct KnownHostsStore {
    hosts: RwLock<HashMap<String, Vec<HostKeyEntry>>>,
    path: PathBuf,
}

impl KnownHostsStore {
    /// Open `~/.ssh/known_hosts`
    pub fn open_default() -> Self {
        let path = dirs::home_dir()
            .map(|h| h.join(".ssh").join("known_hosts"))
            .unwrap_or_else(|| PathBuf::from(".ssh/known_hosts"));
        Self::open(path)
    }

    /// Open a specific file. A missing or unreadable file yields an empty store.
    pub fn open(path: PathBuf) -> Self {
        let hosts = match Self::read_entries(&path) {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!("Failed to load known_hosts {:?}: {}", path, e);
                HashMap::new()
            }
        };

        Self {
            hosts: RwLock::new(hosts),
            path,
        }
    }

    fn read_entries(path: &Path) -> Result<HashMap<String, Vec<HostKeyEntry>>, SshError> {
        let mut hosts: HashMap<String, Vec<HostKeyEntry>> = HashMap::new();
        if !path.exists() {
            return Ok(hosts);
        }

        let reader = BufReader::new(fs::File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // hostname[,alias] keytype base64key [comment]
            let mut parts = line.split_whitespace();
            let (Some(names), Some(key_type), Some(key_data)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };

            let entry = HostKeyEntry {
                key_type: key_type.to_string(),
                key_data: key_data.to_string(),
            };
            // Hashed hostnames (|1|...) cannot be matched by name
            for name in names.split(',').filter(|n| !n.starts_with('|')) {
                hosts
                    .entry(Self::normalize_hostname(name))
                    .or_default()
                    .push(entry.clone());
            }
        }

        debug!("Loaded {} known hosts from {:?}", hosts.len(), path);
        Ok(hosts)
    }

    /// Lookup key for a known_hosts name: `[host]:22` and `host` both map to
    /// the lowercase host, `[host]:port` keeps its port
    fn normalize_hostname(name: &str) -> String {
        let name = name.to_lowercase();
        let Some(rest) = name.strip_prefix('[') else {
            return name;
        };
        match rest.split_once("]:") {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => Self::make_key(host, port),
                Err(_) => name.clone(),
            },
            None => rest.trim_end_matches(']').to_string(),
        }
    }

    fn make_key(host: &str, port: u16) -> String {
        let host = host.to_lowercase();
        if port == 22 {
            host
        } else {
            format!("[{}]:{}", host, port)
        }
    }

    fn fingerprint_bytes(bytes: &[u8]) -> String {
        let hash = Sha256::digest(bytes);
        format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
    }

    /// OpenSSH-style SHA256 fingerprint
    pub fn fingerprint(key: &PublicKey) -> String {
        Self::fingerprint_bytes(&key.public_key_bytes())
    }

    /// Check a presented key against the recorded ones for `host:port`
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyVerification {
        let actual_b64 = BASE64.encode(key.public_key_bytes());
        let actual_type = key.algorithm().as_str().to_string();
        let fingerprint = Self::fingerprint(key);

        let hosts = self.hosts.read();
        let entries = hosts.get(&Self::make_key(host, port));

        let recorded = entries
            .into_iter()
            .flatten()
            .find(|entry| entry.key_type == actual_type);

        match recorded {
            Some(entry) if entry.key_data == actual_b64 => HostKeyVerification::Verified,
            Some(entry) => {
                let expected_fingerprint = BASE64
                    .decode(&entry.key_data)
                    .map(|bytes| Self::fingerprint_bytes(&bytes))
                    .unwrap_or_else(|_| "unknown".to_string());
                HostKeyVerification::Changed {
                    expected_fingerprint,
                    actual_fingerprint: fingerprint,
                }
            }
            None => HostKeyVerification::Unknown { fingerprint },
        }
    }

    /// Record a newly accepted key, in memory and on disk
    pub fn add_host(&self, host: &str, port: u16, key: &PublicKey) -> Result<(), SshError> {
        let lookup_key = Self::make_key(host, port);
        let key_b64 = BASE64.encode(key.public_key_bytes());
        let key_type = key.algorithm().as_str().to_string();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{} {} {}", lookup_key, key_type, key_b64)?;

        self.hosts
            .write()
            .entry(lookup_key.clone())
            .or_default()
            .push(HostKeyEntry {
                key_type: key_type.clone(),
                key_data: key_b64,
            });

        info!("Added {} key for {} to {:?}", key_type, lookup_key, self.path);
        Ok(())
    }
}
