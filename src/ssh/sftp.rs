//! SFTP file transfer implementation.

use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use russh::client::Handle;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{BackupError, Result};
use crate::ssh::client::ClientHandler;

const CHUNK_SIZE: usize = 64 * 1024;

/// SFTP client for file transfers.
pub struct SftpClient {
    session: SftpSession,
}

impl SftpClient {
    /// Create a new SFTP client from an SSH session.
    pub async fn new(ssh_session: &Handle<ClientHandler>) -> Result<Self> {
        let channel = ssh_session
            .channel_open_session()
            .await
            .map_err(|e| BackupError::Transfer(format!("Failed to open SFTP channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| BackupError::Transfer(format!("Failed to request SFTP subsystem: {}", e)))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| BackupError::Transfer(format!("Failed to initialize SFTP: {}", e)))?;

        Ok(Self { session: sftp })
    }

    /// Download a remote file to `local_path`, creating parent directories.
    ///
    /// Data is streamed into `<local_path>.part` and renamed into place once complete,
    /// so an interrupted transfer never leaves a truncated file under the final name.
    /// Returns the number of bytes written.
    pub async fn download(
        &self,
        remote_path: &str,
        local_path: &Path,
        progress: &ProgressBar,
    ) -> Result<u64> {
        if let Ok(attrs) = self.session.metadata(remote_path).await {
            if let Some(size) = attrs.size {
                progress.set_length(size);
            }
        }

        let remote_file = self.session.open(remote_path).await.map_err(|e| {
            BackupError::Transfer(format!("Failed to open remote file {}: {}", remote_path, e))
        })?;

        write_part(remote_file, local_path, progress).await
    }
}

/// Removes the `.part` file when dropped, unless disarmed after the rename.
///
/// Covers cancellation too: a timed-out download drops the future mid-copy.
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Stream `reader` into `<local_path>.part`, then rename it into place.
///
/// Parent directories are created as needed. Returns the number of bytes written.
async fn write_part<R>(mut reader: R, local_path: &Path, progress: &ProgressBar) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            BackupError::Transfer(format!(
                "Failed to create local directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut part = PartFile::new(partial_path(local_path));
    let mut local_file = tokio::fs::File::create(&part.path).await.map_err(|e| {
        BackupError::Transfer(format!(
            "Failed to create local file {}: {}",
            part.path.display(),
            e
        ))
    })?;

    let write_err =
        |e: std::io::Error| BackupError::Transfer(format!("Failed to write local file: {}", e));

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| BackupError::Transfer(format!("Failed to read remote file: {}", e)))?;
        if n == 0 {
            break;
        }
        local_file.write_all(&buf[..n]).await.map_err(write_err)?;
        total += n as u64;
        progress.inc(n as u64);
    }

    local_file.flush().await.map_err(write_err)?;
    local_file.sync_all().await.map_err(write_err)?;
    drop(local_file);

    tokio::fs::rename(&part.path, local_path).await.map_err(|e| {
        BackupError::Transfer(format!(
            "Failed to move download into place at {}: {}",
            local_path.display(),
            e
        ))
    })?;
    part.disarm();

    Ok(total)
}

/// `<path>.part` sibling used while a download is in flight.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    /// Yields one chunk, then fails like a dropped SFTP channel.
    struct FailingReader {
        sent: bool,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "channel closed",
                )));
            }
            self.sent = true;
            buf.put_slice(b"first chunk");
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_part_renames_complete_download() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("nested/world.zip");
        let progress = ProgressBar::hidden();

        let written = write_part(&b"archive bytes"[..], &local, &progress)
            .await
            .unwrap();

        assert_eq!(written, 13);
        assert_eq!(progress.position(), 13);
        assert_eq!(std::fs::read(&local).unwrap(), b"archive bytes");
        assert!(!partial_path(&local).exists());
    }

    #[tokio::test]
    async fn test_write_part_removes_part_on_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("world.zip");

        let err = write_part(FailingReader { sent: false }, &local, &ProgressBar::hidden())
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::Transfer(_)), "{}", err);
        assert!(!partial_path(&local).exists());
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_write_part_removes_part_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("world.zip");
        let (mut remote, reader) = tokio::io::duplex(1024);
        remote.write_all(b"half an archive").await.unwrap();

        // Writer stays open, so the copy stalls until the timeout drops it.
        let progress = ProgressBar::hidden();
        let result = tokio::time::timeout(
            Duration::from_millis(200),
            write_part(reader, &local, &progress),
        )
        .await;

        assert!(result.is_err());
        assert!(!partial_path(&local).exists());
        assert!(!local.exists());
        drop(remote);
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/backups/world_01_02_2026.zip")),
            PathBuf::from("/backups/world_01_02_2026.zip.part")
        );
    }
}
