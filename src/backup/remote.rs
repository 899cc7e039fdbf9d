//! Seams between the backup workflow and the SSH transport.

use std::path::Path;

use async_trait::async_trait;
use indicatif::ProgressBar;

use crate::config::BackupConfig;
use crate::error::Result;
use crate::ssh::{CommandOutput, SshClient, SshConfig};

/// An open, authenticated session on the remote host.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run a shell command and wait for it to finish.
    async fn exec(&mut self, command: &str) -> Result<CommandOutput>;

    /// Copy a remote file to `local_path`. Returns the number of bytes written.
    async fn download(
        &mut self,
        remote_path: &str,
        local_path: &Path,
        progress: &ProgressBar,
    ) -> Result<u64>;

    /// Terminate the session.
    async fn close(&mut self) -> Result<()>;
}

/// Opens sessions to one configured target.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: RemoteSession;

    async fn connect(&self) -> Result<Self::Session>;

    /// `user@host:port`, for log lines.
    fn target(&self) -> String;
}

/// [`Connector`] backed by russh.
pub struct SshConnector {
    host: String,
    port: u16,
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            config: SshConfig::from(config),
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self) -> Result<SshSession> {
        let client = SshClient::connect(&self.host, self.port, &self.config).await?;
        Ok(SshSession { client })
    }

    fn target(&self) -> String {
        format!("{}@{}:{}", self.config.user, self.host, self.port)
    }
}

pub struct SshSession {
    client: SshClient,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        self.client.exec(command).await
    }

    async fn download(
        &mut self,
        remote_path: &str,
        local_path: &Path,
        progress: &ProgressBar,
    ) -> Result<u64> {
        let sftp = self.client.sftp().await?;
        sftp.download(remote_path, local_path, progress).await
    }

    async fn close(&mut self) -> Result<()> {
        tracing::debug!("Closing session to {}", self.client.host());
        self.client.disconnect().await
    }
}
