use thiserror::Error;

/// Workflow stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Connect,
    Archive,
    Download,
    Cleanup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Connect => "connect",
            Stage::Archive => "archive",
            Stage::Download => "download",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Remote archive command failed ({}): {stderr}", exit_label(.code))]
    Archive { code: Option<u32>, stderr: String },

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Remote cleanup failed: {0}")]
    Cleanup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    SshProtocol(#[from] russh::Error),
}

fn exit_label(code: &Option<u32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit status".to_string(),
    }
}

impl BackupError {
    /// Stage of the run this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            BackupError::Configuration(_) => Stage::Configuration,
            BackupError::Authentication(_)
            | BackupError::Connection(_)
            | BackupError::SshProtocol(_) => Stage::Connect,
            BackupError::Archive { .. } => Stage::Archive,
            BackupError::Transfer(_) | BackupError::Io(_) => Stage::Download,
            BackupError::Cleanup(_) => Stage::Cleanup,
        }
    }

    /// Process exit status for a run that ended with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            BackupError::Configuration(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
