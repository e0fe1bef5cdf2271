use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::{self, OpenOptions};
use tracing::{debug, warn};

use crate::error::{HelperError, HelperResult};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive advisory lock held across the connect check-and-start sequence
///
/// Separate helper processes serialize on `flock(2)` of a shared lock file,
/// so two connects for different profiles cannot both observe an empty
/// active set. Released when dropped (or when the process exits).
#[derive(Debug)]
pub struct ConnectLock {
    file: File,
    path: PathBuf,
}

impl ConnectLock {
    /// Wait up to `timeout` for the lock at `path`
    pub async fn acquire(path: &Path, timeout: Duration) -> HelperResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o600)
            .custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC)
            .open(path)
            .await?
            .into_std()
            .await;

        let deadline = Instant::now() + timeout;
        loop {
            if try_lock(&file)? {
                debug!("Acquired connect lock {:?}", path);
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if Instant::now() >= deadline {
                return Err(HelperError::Timeout(format!(
                    "connect lock {:?} still held after {} seconds",
                    path,
                    timeout.as_secs()
                )));
            }

            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn try_lock(file: &File) -> io::Result<bool> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK || code == libc::EINTR => Ok(false),
        _ => Err(err),
    }
}

impl Drop for ConnectLock {
    fn drop(&mut self) {
        let rc = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if rc != 0 {
            warn!("Failed to release connect lock {:?}: {}", self.path, io::Error::last_os_error());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run").join("connect.lock");

        let held = ConnectLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
        assert_eq!(held.path(), path.as_path());

        let err = ConnectLock::acquire(&path, Duration::from_millis(120)).await.unwrap_err();
        assert_eq!(err.code(), "TIMEOUT");

        drop(held);
        assert!(ConnectLock::acquire(&path, Duration::from_millis(120)).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_refuses_symlink() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        std::fs::write(&target, "").unwrap();
        let path = dir.path().join("connect.lock");
        std::os::unix::fs::symlink(&target, &path).unwrap();

        let err = ConnectLock::acquire(&path, Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err.code(), "IO_ERROR");
    }
}
