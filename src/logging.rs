//! Logging setup using tracing.
//!
//! Configured once at startup: a compact stderr layer, plus an optional plain-text
//! file layer for a persistent run log.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{BackupError, Result};

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "foundry_backup=debug"
    } else {
        "foundry_backup=info"
    }
}

/// Open the log file for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> Result<File> {
    let cannot_open = |e: std::io::Error| {
        BackupError::Configuration(format!("Cannot open log file {}: {}", path.display(), e))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(cannot_open)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(cannot_open)
}

/// Install the global subscriber. `RUST_LOG` overrides the default level.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let file_layer = match log_file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| BackupError::Configuration(format!("Failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "foundry_backup=info");
        assert_eq!(default_directive(true), "foundry_backup=debug");
    }

    #[test]
    fn test_open_log_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/nested/backup.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_log_dir_under_regular_file_is_config_error() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let path = blocker.path().join("logs/backup.log");

        let err = open_log_file(&path).unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)), "{}", err);
        assert_eq!(err.exit_code(), 2);
    }
}
