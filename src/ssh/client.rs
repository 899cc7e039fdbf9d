//! SSH client implementation using russh.
//!
//! Provides connection management, host key verification and key authentication.

use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;

use crate::error::{BackupError, Result};
use crate::ssh::config::{HostKeyPolicy, SshConfig};
use crate::ssh::exec::CommandOutput;
use crate::ssh::sftp::SftpClient;

/// SSH client wrapper over russh.
pub struct SshClient {
    session: Handle<ClientHandler>,
    host: String,
}

impl SshClient {
    /// Connect to an SSH server and authenticate with the configured key.
    ///
    /// Network-level problems surface as [`BackupError::Connection`]; a rejected or
    /// unusable key as [`BackupError::Authentication`].
    pub async fn connect(host: &str, port: u16, config: &SshConfig) -> Result<Self> {
        // Load the key first so a bad credential never touches the network.
        let key = crate::ssh::keys::load_private_key(
            &config.key_path,
            config.key_passphrase.as_ref().map(|p| p.expose()),
        )?;

        if let Ok(fp) = crate::ssh::keys::key_fingerprint(&config.key_path) {
            tracing::debug!("Using key {} ({})", config.key_path.display(), fp);
        }

        let russh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            // Send keep-alive every 15 seconds
            keepalive_interval: Some(std::time::Duration::from_secs(15)),
            // Allow up to 4 missed keep-alives before disconnect (60 seconds)
            keepalive_max: 4,
            ..Default::default()
        });

        // Resolve hostname to IP
        let addr = format!("{}:{}", host, port)
            .to_socket_addrs()
            .map_err(|e| BackupError::Connection(format!("Failed to resolve {}: {}", host, e)))?
            .next()
            .ok_or_else(|| BackupError::Connection(format!("No address found for {}", host)))?;

        let handler = ClientHandler {
            host: host.to_string(),
            port,
            host_key_policy: config.host_key_policy,
            known_hosts: config.known_hosts_path(),
        };

        let mut session = tokio::time::timeout(
            config.connect_timeout,
            client::connect(russh_config, addr, handler),
        )
        .await
        .map_err(|_| {
            BackupError::Connection(format!(
                "Timed out connecting to {}:{} after {}s",
                host,
                port,
                config.connect_timeout.as_secs()
            ))
        })?
        .map_err(|e| match e {
            BackupError::Connection(_) => e,
            other => BackupError::Connection(format!("Connection failed: {}", other)),
        })?;

        let authenticated = tokio::time::timeout(
            config.connect_timeout,
            session.authenticate_publickey(&config.user, key),
        )
        .await
        .map_err(|_| {
            BackupError::Connection(format!("Timed out authenticating to {}:{}", host, port))
        })?
        .map_err(|e| BackupError::Connection(format!("Authentication exchange failed: {}", e)))?;

        if !authenticated {
            return Err(BackupError::Authentication(format!(
                "{}@{} rejected key {}",
                config.user,
                host,
                config.key_path.display()
            )));
        }

        tracing::debug!("Authenticated as {}@{}:{}", config.user, host, port);

        Ok(Self {
            session,
            host: host.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Execute a command on the remote host (non-interactive).
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        crate::ssh::exec::exec_command(&self.session, command).await
    }

    /// Get an SFTP client for file transfers.
    pub async fn sftp(&self) -> Result<SftpClient> {
        SftpClient::new(&self.session).await
    }

    /// Send an SSH disconnect and release the session.
    pub async fn disconnect(&self) -> Result<()> {
        self.session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| BackupError::Connection(format!("Failed to disconnect: {}", e)))
    }
}

/// Client handler for russh connection callbacks.
pub struct ClientHandler {
    pub host: String,
    pub port: u16,
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts: Option<PathBuf>,
}

impl ClientHandler {
    /// Apply the host key policy to a key presented by the server.
    pub fn verify_host_key(&self, server_public_key: &russh_keys::PublicKey) -> Result<bool> {
        if self.host_key_policy == HostKeyPolicy::AcceptAny {
            return Ok(true);
        }

        let Some(path) = self.known_hosts.as_ref() else {
            return Err(BackupError::Connection(
                "Cannot verify host key: no known_hosts location available".to_string(),
            ));
        };

        match russh_keys::check_known_hosts_path(&self.host, self.port, server_public_key, path) {
            Ok(true) => Ok(true),
            Ok(false) if self.host_key_policy == HostKeyPolicy::AcceptNew => {
                tracing::info!(
                    "Adding host key for {}:{} to {}",
                    self.host,
                    self.port,
                    path.display()
                );
                if let Err(e) = russh_keys::known_hosts::learn_known_hosts_path(
                    &self.host,
                    self.port,
                    server_public_key,
                    path,
                ) {
                    tracing::warn!("Could not record host key in {}: {}", path.display(), e);
                }
                Ok(true)
            }
            Ok(false) => Err(BackupError::Connection(format!(
                "Host key for {}:{} is not in {} (HOST_KEY_POLICY=strict)",
                self.host,
                self.port,
                path.display()
            ))),
            Err(e) => Err(BackupError::Connection(format!(
                "Host key verification failed for {}:{}: {}",
                self.host, self.port, e
            ))),
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = BackupError;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        self.verify_host_key(server_public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_key() -> tempfile::NamedTempFile {
        use ssh_key::{Algorithm, LineEnding, PrivateKey};
        use std::io::Write;

        let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(key.to_openssh(LineEnding::LF).unwrap().as_bytes())
            .unwrap();
        file
    }

    fn server_key() -> russh_keys::PublicKey {
        let file = test_key();
        let key = crate::ssh::keys::load_private_key(file.path(), None).unwrap();
        key.public_key().clone()
    }

    fn handler(policy: HostKeyPolicy, known_hosts: &std::path::Path) -> ClientHandler {
        ClientHandler {
            host: "127.0.0.1".to_string(),
            port: 2222,
            host_key_policy: policy,
            known_hosts: Some(known_hosts.to_path_buf()),
        }
    }

    #[test]
    fn test_accept_new_learns_unknown_key_and_rejects_changed_key() {
        let dir = tempfile::tempdir().unwrap();
        let known_hosts = dir.path().join("known_hosts");
        let original = server_key();

        let handler = handler(HostKeyPolicy::AcceptNew, &known_hosts);
        assert!(handler.verify_host_key(&original).unwrap());
        assert!(known_hosts.exists());

        // Learned key is accepted on the next connection.
        assert!(handler.verify_host_key(&original).unwrap());

        let err = handler.verify_host_key(&server_key()).unwrap_err();
        assert!(matches!(err, BackupError::Connection(_)), "{}", err);
    }

    #[test]
    fn test_strict_rejects_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let known_hosts = dir.path().join("known_hosts");
        let key = server_key();

        let err = handler(HostKeyPolicy::Strict, &known_hosts)
            .verify_host_key(&key)
            .unwrap_err();
        assert!(err.to_string().contains("HOST_KEY_POLICY=strict"), "{}", err);
        assert!(!known_hosts.exists());

        handler(HostKeyPolicy::AcceptNew, &known_hosts)
            .verify_host_key(&key)
            .unwrap();
        assert!(handler(HostKeyPolicy::Strict, &known_hosts)
            .verify_host_key(&key)
            .unwrap());
    }

    #[test]
    fn test_accept_any_skips_known_hosts() {
        let handler = ClientHandler {
            host: "127.0.0.1".to_string(),
            port: 22,
            host_key_policy: HostKeyPolicy::AcceptAny,
            known_hosts: None,
        };
        assert!(handler.verify_host_key(&server_key()).unwrap());
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop to get a port that is very likely closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let key = test_key();
        let mut config = SshConfig::new("backup", key.path());
        config.host_key_policy = HostKeyPolicy::AcceptAny;
        config.connect_timeout = Duration::from_secs(5);

        let err = SshClient::connect("127.0.0.1", port, &config)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BackupError::Connection(_)), "{}", err);
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_server() {
        // Accepts TCP but never speaks SSH.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let key = test_key();
        let mut config = SshConfig::new("backup", key.path());
        config.host_key_policy = HostKeyPolicy::AcceptAny;
        config.connect_timeout = Duration::from_millis(300);

        let err = SshClient::connect("127.0.0.1", port, &config)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("Timed out"), "{}", err);
    }

    #[tokio::test]
    async fn test_unreadable_key_fails_before_connecting() {
        let mut config = SshConfig::new("backup", "/nonexistent/id_ed25519");
        config.connect_timeout = Duration::from_millis(100);

        let err = SshClient::connect("127.0.0.1", 1, &config).await.err().unwrap();
        assert!(matches!(err, BackupError::Authentication(_)), "{}", err);
    }
}
