//! Archive file names and the remote commands that create and remove them.

use std::time::Duration;

use chrono::NaiveDate;

use crate::ssh::shell_quote;

/// `strftime` pattern for the date suffix: `_DD_MM_YYYY`.
pub const DATE_FORMAT: &str = "%d_%m_%Y";

const ZIP_EXTENSION: &str = ".zip";

/// Exit status of coreutils `timeout` when it had to stop the command.
pub const REMOTE_TIMEOUT_EXIT: u32 = 124;

/// Build an archive file name from a configured base name.
///
/// `base` → `base_DD_MM_YYYY.zip` with a date, `base.zip` without.
/// A trailing `.zip` on `base` is dropped first so the extension is never doubled.
pub fn archive_name(base: &str, date: Option<NaiveDate>) -> String {
    let stem = base.strip_suffix(ZIP_EXTENSION).unwrap_or(base);

    match date {
        Some(date) => format!("{}_{}{}", stem, date.format(DATE_FORMAT), ZIP_EXTENSION),
        None => format!("{}{}", stem, ZIP_EXTENSION),
    }
}

/// Remote command that (re)creates `archive` from `directory`.
///
/// Any existing file with the same name is removed first: `zip -r` would otherwise
/// update it in place and carry stale entries into the new backup.
/// `zip` runs under `timeout` so the remote process stops on its own once `limit`
/// (rounded up to whole seconds) has passed, exiting with [`REMOTE_TIMEOUT_EXIT`].
pub fn zip_command(archive: &str, directory: &str, limit: Duration) -> String {
    let archive = shell_quote(archive);
    format!(
        "rm -f {} && timeout {} zip -q -r {} {}",
        archive,
        whole_seconds(limit),
        archive,
        shell_quote(directory)
    )
}

fn whole_seconds(limit: Duration) -> u64 {
    let secs = limit.as_secs() + u64::from(limit.subsec_nanos() > 0);
    secs.max(1)
}

/// Remote command that deletes `archive`. Succeeds when the file is already gone.
pub fn remove_command(archive: &str) -> String {
    format!("rm -f {}", shell_quote(archive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2026, 3, 7)
    }

    #[test]
    fn test_archive_name_with_date() {
        assert_eq!(archive_name("foundry", date()), "foundry_07_03_2026.zip");
    }

    #[test]
    fn test_archive_name_without_date() {
        assert_eq!(archive_name("foundry", None), "foundry.zip");
    }

    #[test]
    fn test_archive_name_strips_zip_extension() {
        assert_eq!(archive_name("foundry.zip", date()), "foundry_07_03_2026.zip");
        assert_eq!(archive_name("foundry.zip", None), "foundry.zip");
    }

    #[test]
    fn test_same_date_same_suffix() {
        let remote = archive_name("remote-world", date());
        let local = archive_name("local-world", date());
        assert!(remote.ends_with("_07_03_2026.zip"));
        assert!(local.ends_with("_07_03_2026.zip"));
    }

    #[test]
    fn test_zip_command() {
        assert_eq!(
            zip_command("world_07_03_2026.zip", "/home/foundry/Data", Duration::from_secs(3600)),
            "rm -f 'world_07_03_2026.zip' && timeout 3600 zip -q -r 'world_07_03_2026.zip' '/home/foundry/Data'"
        );
    }

    #[test]
    fn test_zip_command_rounds_limit_up() {
        let cmd = zip_command("a.zip", "/data", Duration::from_millis(50));
        assert!(cmd.contains("timeout 1 zip"), "{}", cmd);

        let cmd = zip_command("a.zip", "/data", Duration::from_millis(90_500));
        assert!(cmd.contains("timeout 91 zip"), "{}", cmd);
    }

    #[test]
    fn test_commands_quote_hostile_paths() {
        let cmd = zip_command("a.zip", "/data/it's; rm -rf ~", Duration::from_secs(60));
        assert!(cmd.ends_with("'/data/it'\\''s; rm -rf ~'"));
        assert_eq!(remove_command("a b.zip"), "rm -f 'a b.zip'");
    }
}
