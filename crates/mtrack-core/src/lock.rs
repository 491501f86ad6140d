//! Exclusive lock on an output directory.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::ErrorCode;

/// Lock file kept inside each grouping directory.
pub const LOCK_FILE_NAME: &str = ".mtrack.lock";

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another run holds {} (waited {waited:?})", .path.display())]
    Timeout { path: PathBuf, waited: Duration },

    #[error("cannot lock output directory: {0}")]
    Io(#[from] io::Error),
}

impl LockError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::Io(_) => ErrorCode::OutputNotConfigured,
        }
    }
}

/// Held for the whole run; unlocks on drop.
#[derive(Debug)]
pub struct OutputLock {
    file: File,
    path: PathBuf,
}

impl OutputLock {
    /// Lock `directory`, retrying until `timeout` has passed.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] while another run holds the directory,
    /// [`LockError::Io`] when the lock file cannot be opened.
    pub fn acquire(directory: &Path, timeout: Duration) -> Result<Self, LockError> {
        fs::create_dir_all(directory)?;
        let path = directory.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let start = Instant::now();
        while file.try_lock_exclusive().is_err() {
            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path,
                    waited: start.elapsed(),
                });
            }
            thread::sleep(RETRY_INTERVAL);
        }
        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_run_times_out_while_the_first_holds_the_lock() {
        let dir = TempDir::new().unwrap();
        let held = OutputLock::acquire(dir.path(), Duration::from_millis(50)).unwrap();
        assert_eq!(held.path(), dir.path().join(LOCK_FILE_NAME));

        let err = OutputLock::acquire(dir.path(), Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
        assert_eq!(err.code(), ErrorCode::LockContention);
    }

    #[test]
    fn dropping_the_lock_frees_the_directory() {
        let dir = TempDir::new().unwrap();
        drop(OutputLock::acquire(dir.path(), Duration::from_millis(50)).unwrap());
        assert!(OutputLock::acquire(dir.path(), Duration::from_millis(50)).is_ok());
    }
}
