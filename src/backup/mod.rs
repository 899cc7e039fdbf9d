//! The backup workflow: connect, zip the remote directory, download it, clean up.
//!
//! [`BackupRunner`] drives one job through a fixed sequence of [`RunState`]s. Once a
//! session exists, the remote archive is always removed and the session closed,
//! whether or not the earlier steps succeeded.

pub mod naming;
pub mod remote;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use indicatif::ProgressBar;
use tracing::Instrument;

use crate::config::BackupConfig;
use crate::error::{BackupError, Result};

pub use remote::{Connector, RemoteSession, SshConnector};

/// Extra time the local archive deadline allows past the remote `timeout`.
const ARCHIVE_GRACE: Duration = Duration::from_secs(5);

/// Per-run state of a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Connecting,
    Connected,
    Archiving,
    Archived,
    Downloading,
    Downloaded,
    Cleaning,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Connecting => "connecting",
            RunState::Connected => "connected",
            RunState::Archiving => "archiving",
            RunState::Archived => "archived",
            RunState::Downloading => "downloading",
            RunState::Downloaded => "downloaded",
            RunState::Cleaning => "cleaning",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The concrete names and paths of one run, derived from a [`BackupConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJob {
    pub remote_directory: String,
    pub remote_archive: String,
    pub local_path: PathBuf,
    pub command_timeout: Duration,
}

impl BackupJob {
    /// Derive names for a run. `date` is applied to both remote and local names.
    pub fn new(config: &BackupConfig, date: Option<NaiveDate>) -> Self {
        let remote_archive = naming::archive_name(&config.remote_archive_base, date);
        let local_archive = naming::archive_name(&config.local_archive_base, date);

        Self {
            remote_directory: config.remote_directory.clone(),
            remote_archive,
            local_path: config.local_directory.join(local_archive),
            command_timeout: config.command_timeout,
        }
    }

    /// Derive names using today's local date when the config asks for a suffix.
    pub fn for_today(config: &BackupConfig) -> Self {
        let date = config
            .date_suffix
            .then(|| chrono::Local::now().date_naive());
        Self::new(config, date)
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub remote_archive: String,
    pub local_path: PathBuf,
    pub bytes: u64,
    pub elapsed: Duration,
    /// Set when the remote archive could not be removed. The backup itself is intact.
    pub cleanup_warning: Option<String>,
    pub states: Vec<RunState>,
}

/// Runs one [`BackupJob`] against one host.
pub struct BackupRunner<C: Connector> {
    connector: C,
    job: BackupJob,
    span: tracing::Span,
    progress: ProgressBar,
    states: Vec<RunState>,
}

impl<C: Connector> BackupRunner<C> {
    /// `span` scopes every log line of the run; pass `tracing::Span::none()` to opt out.
    pub fn new(connector: C, job: BackupJob, span: tracing::Span, progress: ProgressBar) -> Self {
        Self {
            connector,
            job,
            span,
            progress,
            states: vec![RunState::Idle],
        }
    }

    /// States visited so far, starting with [`RunState::Idle`].
    pub fn states(&self) -> &[RunState] {
        &self.states
    }

    pub fn state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Idle)
    }

    pub async fn run(&mut self) -> Result<RunReport> {
        let span = self.span.clone();
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> Result<RunReport> {
        let started = Instant::now();

        self.transition(RunState::Connecting);
        tracing::info!("Connecting to {}", self.connector.target());

        let mut session = match self.connector.connect().await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e)),
        };
        self.transition(RunState::Connected);

        let outcome = self.archive_and_download(&mut session).await;

        self.transition(RunState::Cleaning);
        let cleanup_warning = self.cleanup(&mut session).await;

        match outcome {
            Ok(bytes) => {
                self.transition(RunState::Done);
                tracing::info!(
                    "Backup complete: {} ({} bytes)",
                    self.job.local_path.display(),
                    bytes
                );
                Ok(RunReport {
                    remote_archive: self.job.remote_archive.clone(),
                    local_path: self.job.local_path.clone(),
                    bytes,
                    elapsed: started.elapsed(),
                    cleanup_warning,
                    states: self.states.clone(),
                })
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn archive_and_download(&mut self, session: &mut C::Session) -> Result<u64> {
        self.transition(RunState::Archiving);
        self.archive(session).await?;
        self.transition(RunState::Archived);

        self.transition(RunState::Downloading);
        let bytes = self.download(session).await?;
        self.transition(RunState::Downloaded);

        Ok(bytes)
    }

    async fn archive(&self, session: &mut C::Session) -> Result<()> {
        let limit = self.job.command_timeout;
        let command =
            naming::zip_command(&self.job.remote_archive, &self.job.remote_directory, limit);
        tracing::info!(
            "Archiving {} into {}",
            self.job.remote_directory,
            self.job.remote_archive
        );

        // The remote `timeout` fires first; the local deadline only catches a stuck channel.
        let deadline = limit + limit.min(ARCHIVE_GRACE);
        let output = match tokio::time::timeout(deadline, session.exec(&command)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(BackupError::Archive {
                    code: None,
                    stderr: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BackupError::Archive {
                    code: None,
                    stderr: format!(
                        "timed out after {}s",
                        self.job.command_timeout.as_secs()
                    ),
                })
            }
        };

        if output.exit_code == Some(naming::REMOTE_TIMEOUT_EXIT) {
            return Err(BackupError::Archive {
                code: output.exit_code,
                stderr: format!("timed out after {}s on the remote host", limit.as_secs()),
            });
        }

        if !output.success {
            return Err(BackupError::Archive {
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(())
    }

    async fn download(&self, session: &mut C::Session) -> Result<u64> {
        tracing::info!(
            "Downloading {} to {}",
            self.job.remote_archive,
            self.job.local_path.display()
        );

        let result = tokio::time::timeout(
            self.job.command_timeout,
            session.download(&self.job.remote_archive, &self.job.local_path, &self.progress),
        )
        .await;
        self.progress.finish_and_clear();

        match result {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(BackupError::Transfer(msg))) => Err(BackupError::Transfer(msg)),
            Ok(Err(e)) => Err(BackupError::Transfer(e.to_string())),
            Err(_) => Err(BackupError::Transfer(format!(
                "timed out after {}s",
                self.job.command_timeout.as_secs()
            ))),
        }
    }

    /// Remove the remote archive and close the session. Never fails the run;
    /// problems are logged and returned as a warning.
    async fn cleanup(&self, session: &mut C::Session) -> Option<String> {
        let command = naming::remove_command(&self.job.remote_archive);
        tracing::info!("Removing remote archive {}", self.job.remote_archive);

        let result = match tokio::time::timeout(self.job.command_timeout, session.exec(&command))
            .await
        {
            Ok(Ok(output)) if output.success => Ok(()),
            Ok(Ok(output)) => Err(BackupError::Cleanup(format!(
                "rm exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            ))),
            Ok(Err(e)) => Err(BackupError::Cleanup(e.to_string())),
            Err(_) => Err(BackupError::Cleanup(format!(
                "timed out after {}s",
                self.job.command_timeout.as_secs()
            ))),
        };

        if let Err(e) = session.close().await {
            tracing::debug!("Session close: {}", e);
        }

        match result {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("{} (remote file: {})", e, self.job.remote_archive);
                Some(e.to_string())
            }
        }
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(!self.state().is_terminal(), "transition out of a terminal state");
        tracing::debug!("{} -> {}", self.state(), next);
        self.states.push(next);
    }

    fn fail(&mut self, err: BackupError) -> BackupError {
        tracing::error!(stage = %err.stage(), "{}", err);
        self.transition(RunState::Failed);
        err
    }
}
