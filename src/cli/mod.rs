pub mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{parse_duration, BackupConfig};
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "foundry-backup")]
#[command(version)]
#[command(about = "Back up a remote directory over SSH")]
#[command(long_about = "Zip a directory on a remote host, download the archive over SFTP, \
then delete the remote copy.\n\nSettings come from the optional CONFIG file (dotenv, or YAML \
with a .yaml/.yml extension) and from environment variables, which take precedence.")]
pub struct Cli {
    /// Path to the configuration file
    pub config: Option<PathBuf>,

    /// Do not append the _DD_MM_YYYY date suffix to archive names
    #[arg(long)]
    pub no_date_suffix: bool,

    /// Also write the run log to this file
    #[arg(long, value_name = "PATH", env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Timeout for each remote step (e.g. 30m, 2h, 90s)
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Print the resolved settings and exit without connecting
    #[arg(long)]
    pub show_config: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_timeout(s: &str) -> std::result::Result<Duration, String> {
    match parse_duration(s) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(format!("invalid duration '{}'", s)),
    }
}

impl Cli {
    /// Load the configuration and apply command-line overrides.
    pub fn resolve_config(&self) -> Result<BackupConfig> {
        let mut config = BackupConfig::load(self.config.as_deref())?;

        if self.no_date_suffix {
            config.date_suffix = false;
        }
        if let Some(timeout) = self.timeout {
            config.command_timeout = timeout;
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = Some(log_file.clone());
        }

        Ok(config)
    }

    pub async fn execute(self) -> Result<()> {
        let config = self.resolve_config()?;

        if self.show_config {
            commands::show::execute(&config);
            return Ok(());
        }

        crate::logging::init(self.verbose, config.log_file.as_deref())?;
        commands::backup::execute(&config).await
    }
}
