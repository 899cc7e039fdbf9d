use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::backup::{BackupJob, BackupRunner, SshConnector};
use crate::config::BackupConfig;
use crate::error::Result;
use crate::utils::{format_bytes, format_duration};

fn download_progress() -> ProgressBar {
    let progress = ProgressBar::new(0);
    if let Ok(bar_style) = ProgressStyle::with_template(
        "  {spinner:.green} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    ) {
        progress.set_style(bar_style.progress_chars("=> "));
    }
    progress
}

pub async fn execute(config: &BackupConfig) -> Result<()> {
    let job = BackupJob::for_today(config);

    println!(
        "  {} {} {}",
        style("→").bold(),
        style(format!("{}@{}", config.username, config.host)).white().bold(),
        style(format!("({})", &config.remote_directory)).dim()
    );

    let span = tracing::info_span!(
        "backup",
        host = %config.host,
        archive = %job.remote_archive
    );
    let mut runner = BackupRunner::new(SshConnector::new(config), job, span, download_progress());
    let report = runner.run().await?;

    println!(
        "  {} Backup saved to {} {}",
        style("✓").green().bold(),
        style(report.local_path.display()).white().bold(),
        style(format!(
            "({}, {})",
            format_bytes(report.bytes),
            format_duration(report.elapsed)
        ))
        .dim()
    );

    if let Some(warning) = &report.cleanup_warning {
        println!(
            "  {} Remote archive {} was not removed: {}",
            style("!").yellow().bold(),
            style(&report.remote_archive).yellow(),
            warning
        );
    }

    Ok(())
}
