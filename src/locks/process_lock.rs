//! Advisory exclusive lock over a single well-known file.

use super::ExclusiveLock;
use crate::error::{OpgateError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Mode for a newly created lock file.
pub const LOCK_FILE_MODE: u32 = 0o600;

/// Non-blocking `flock(2)` wrapper.
///
/// The kernel drops the lock when the descriptor is closed, including when the
/// holder process dies, so a crashed holder never wedges the gate. The
/// descriptor is close-on-exec, so child processes never inherit the lock.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    file: Option<File>,
}

impl ProcessLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Try once to take the lock without blocking.
    ///
    /// Returns `Ok(false)` on contention. A missing directory or an unusable
    /// lock file is an error, never contention. Calling this while already
    /// holding the lock returns `Ok(true)`.
    pub fn try_acquire(&mut self) -> Result<bool> {
        if self.file.is_some() {
            return Ok(true);
        }

        let file = open_lock_file(&self.path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "lock acquired");
                self.file = Some(file);
                Ok(true)
            }
            Err(e) if is_contended(&e) => {
                tracing::debug!(path = %self.path.display(), "lock contended");
                Ok(false)
            }
            Err(e) => Err(OpgateError::from_io(&self.path, e)),
        }
    }

    /// Release the lock if held. A no-op when nothing is held.
    pub fn release(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let result = FileExt::unlock(&file).map_err(|e| OpgateError::from_io(&self.path, e));
        // Closing the descriptor drops the flock even if unlock reported an error.
        drop(file);
        tracing::debug!(path = %self.path.display(), "lock released");
        result
    }
}

impl ExclusiveLock for ProcessLock {
    fn try_acquire(&mut self) -> Result<bool> {
        ProcessLock::try_acquire(self)
    }

    fn release(&mut self) -> Result<()> {
        ProcessLock::release(self)
    }
}

/// Open (creating if needed) the lock file after checking its directory.
pub(crate) fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.is_dir()
    {
        return Err(OpgateError::PathUnavailable {
            path: parent.to_path_buf(),
        });
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(LOCK_FILE_MODE)
        .open(path)
        .map_err(|e| OpgateError::from_io(path, e))
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
