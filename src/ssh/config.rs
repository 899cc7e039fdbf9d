//! SSH connection configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::{BackupConfig, Secret, DEFAULT_CONNECT_TIMEOUT};

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// SSH username.
    pub user: String,

    /// Path to the private key file.
    pub key_path: PathBuf,

    /// Passphrase for an encrypted private key.
    pub key_passphrase: Option<Secret>,

    /// Host key verification policy.
    pub host_key_policy: HostKeyPolicy,

    /// known_hosts file used by `AcceptNew` and `Strict`. Defaults to `~/.ssh/known_hosts`.
    pub known_hosts: Option<PathBuf>,

    /// Upper bound for TCP connect, handshake and authentication.
    pub connect_timeout: Duration,
}

/// Host key verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Accept any host key (insecure, but matches OpenSSH StrictHostKeyChecking=no).
    AcceptAny,

    /// Accept new keys but reject changed keys (matches StrictHostKeyChecking=accept-new).
    #[default]
    AcceptNew,

    /// Only accept keys already present in known_hosts (StrictHostKeyChecking=yes).
    Strict,
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "accept-any" | "no" => Ok(HostKeyPolicy::AcceptAny),
            "accept-new" => Ok(HostKeyPolicy::AcceptNew),
            "strict" | "yes" => Ok(HostKeyPolicy::Strict),
            other => Err(format!("unknown host key policy '{}'", other)),
        }
    }
}

impl std::fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HostKeyPolicy::AcceptAny => "accept-any",
            HostKeyPolicy::AcceptNew => "accept-new",
            HostKeyPolicy::Strict => "strict",
        };
        f.write_str(name)
    }
}

impl SshConfig {
    /// Create a new SSH configuration.
    pub fn new(user: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            key_path: key_path.into(),
            key_passphrase: None,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Resolved known_hosts path.
    pub fn known_hosts_path(&self) -> Option<PathBuf> {
        self.known_hosts
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts")))
    }
}

impl From<&BackupConfig> for SshConfig {
    fn from(config: &BackupConfig) -> Self {
        Self {
            user: config.username.clone(),
            key_path: config.key_path.clone(),
            key_passphrase: config.key_passphrase.clone(),
            host_key_policy: config.host_key_policy,
            known_hosts: config.known_hosts.clone(),
            connect_timeout: config.connect_timeout,
        }
    }
}
