use console::style;

use crate::backup::BackupJob;
use crate::config::BackupConfig;
use crate::utils::format_duration;

pub fn execute(config: &BackupConfig) {
    let job = BackupJob::for_today(config);

    println!("{}", style("Backup Configuration").bold().cyan());
    println!();
    println!(
        "  Target:          {}",
        style(format!("{}@{}:{}", config.username, config.host, config.port)).white()
    );
    println!("  SSH key:         {}", style(config.key_path.display()).dim());
    println!(
        "  Passphrase:      {}",
        if config.key_passphrase.is_some() {
            style("set").green()
        } else {
            style("(none)").dim()
        }
    );
    println!("  Host keys:       {}", style(config.host_key_policy).white());
    println!("  Remote dir:      {}", style(&config.remote_directory).white());
    println!("  Remote archive:  {}", style(&job.remote_archive).yellow());
    println!("  Local archive:   {}", style(job.local_path.display()).yellow());
    println!(
        "  Date suffix:     {}",
        if config.date_suffix {
            style("enabled").green()
        } else {
            style("disabled").dim()
        }
    );
    println!(
        "  Timeouts:        connect {}, step {}",
        format_duration(config.connect_timeout),
        format_duration(config.command_timeout)
    );
    print!("  Log file:        ");
    match &config.log_file {
        Some(path) => println!("{}", style(path.display()).white()),
        None => println!("{}", style("(none)").dim()),
    }
}
