//! Atomic file replacement for the holder record.
//!
//! Waiting operators read the holder record while the holder rewrites it, so
//! the record is never edited in place:
//! 1. Write content to a temporary file in the same directory
//! 2. Sync the file to disk (fsync)
//! 3. `rename()` it over the target
//!
//! A reader therefore sees either the previous record or the new one, never a
//! partial write. The parent directory is NOT created here: a missing
//! directory is a deployment error and surfaces as `PathUnavailable`.

use crate::error::{OpgateError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file, creating it with the given Unix mode.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8], mode: u32) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.is_dir()
    {
        return Err(OpgateError::PathUnavailable {
            path: parent.to_path_buf(),
        });
    }

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content, mode)?;
    atomic_replace(&temp_path, path)
}

/// Temporary sibling path, unique per process.
fn generate_temp_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            OpgateError::ConfigError(format!("invalid file path '{}'", target.display()))
        })?;

    Ok(parent.join(format!(".{}.{}.tmp", filename, std::process::id())))
}

fn write_and_sync(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(|e| OpgateError::from_io(path, e))?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        OpgateError::from_io(path, e)
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        OpgateError::from_io(path, e)
    })
}

fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        OpgateError::from_io(target, e)
    })?;

    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}
