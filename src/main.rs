mod backup;
mod cli;
mod config;
mod error;
mod logging;
mod ssh;
mod utils;

use std::process::ExitCode;

use clap::Parser;
use console::style;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "  {} Backup failed during {}: {}",
                style("✕").red().bold(),
                e.stage(),
                e
            );
            ExitCode::from(e.exit_code())
        }
    }
}
