//! Remote command execution.
//!
//! Provides non-interactive command execution with stdout/stderr and exit status capture.

use russh::client::Handle;
use russh::ChannelMsg;

use crate::error::{BackupError, Result};
use crate::ssh::client::ClientHandler;

/// Output from a remote command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Exit status reported by the server. `None` if the channel closed without one
    /// (e.g. the command was killed by a signal).
    pub exit_code: Option<u32>,

    /// Whether the command succeeded (exit_code == Some(0)).
    pub success: bool,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: Option<u32>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            success: exit_code == Some(0),
        }
    }
}

/// Quote a string for POSIX `sh`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Execute a command on the remote host (non-interactive).
pub async fn exec_command(session: &Handle<ClientHandler>, command: &str) -> Result<CommandOutput> {
    let wrapped_command = format!("sh -c {}", shell_quote(command));

    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| BackupError::Connection(format!("Failed to open channel: {}", e)))?;

    channel
        .exec(true, wrapped_command.as_bytes())
        .await
        .map_err(|e| BackupError::Connection(format!("Failed to execute command: {}", e)))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;

    // The exit status usually arrives after EOF, so keep reading until the channel closes.
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                stdout.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == 1 {
                    stderr.extend_from_slice(&data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                exit_code = Some(exit_status);
            }
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                tracing::debug!("Remote command terminated by signal {:?}", signal_name);
            }
            Some(ChannelMsg::Close) | None => {
                break;
            }
            _ => {}
        }
    }

    let stdout_str = String::from_utf8_lossy(&stdout).to_string();
    let stderr_str = String::from_utf8_lossy(&stderr).to_string();

    tracing::debug!(?exit_code, "Remote command finished: {}", command);

    Ok(CommandOutput::new(stdout_str, stderr_str, exit_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let output = CommandOutput::new("hello", "", Some(0));
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn test_command_output_failure() {
        let output = CommandOutput::new("", "error", Some(1));
        assert!(!output.success);
        assert_eq!(output.stderr, "error");
    }

    #[test]
    fn test_command_output_without_status() {
        let output = CommandOutput::new("", "", None);
        assert!(!output.success);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("with space"), "'with space'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
