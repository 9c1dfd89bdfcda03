use std::{
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::{debug, trace};
use thiserror::Error;

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Exclusive advisory lock, released when dropped.
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Timed out after {}s waiting for the lock on {}", timeout.as_secs(), path.display())]
    Timeout { path: PathBuf, timeout: Duration },
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl FileLock {
    /// Blocks until the lock is acquired or `timeout` elapses.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, Error> {
        let file = File::create(path)?;
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(_) => {
                    trace!("Acquired lock {}", path.display());
                    return Ok(Self {
                        _file: file,
                        path: path.to_path_buf(),
                    });
                }
                Err(error) if error.raw_os_error() == fs4::lock_contended_error().raw_os_error() => {
                    if start.elapsed() >= timeout {
                        return Err(Error::Timeout {
                            path: path.to_path_buf(),
                            timeout,
                        });
                    }
                    debug!(
                        "{} is locked by another process, retrying",
                        path.display()
                    );
                    std::thread::sleep(RETRY_INTERVAL.min(timeout));
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        trace!("Released lock {}", self.path.display());
    }
}
