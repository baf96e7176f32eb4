//! Implementation of the `opgate init` command.
//!
//! Prepares the shared lock directory so that `opgate run` can start. The
//! command is idempotent: existing files and directories are left alone,
//! including an existing holder record.

use crate::config::Config;
use crate::error::{OpgateError, Result};
use crate::locks::ProcessLock;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;

/// Mode for a lock directory created by `init`.
pub const LOCK_DIR_MODE: u32 = 0o750;

/// Execute the `opgate init` command.
pub fn cmd_init(config: &Config) -> Result<()> {
    let dir_created = ensure_lock_dir(config)?;
    let lock_created = ensure_lock_file(config)?;

    println!("Initialized opgate lock directory.");
    println!();
    println!(
        "  Directory: {}{}",
        config.lock_dir.display(),
        if dir_created { "" } else { " (already existed)" }
    );
    println!(
        "  Lock file: {}{}",
        config.lock_path().display(),
        if lock_created { "" } else { " (already existed)" }
    );
    println!("  Holder:    {}", config.holder_path().display());
    Ok(())
}

/// Create the lock directory and any missing parents. Returns whether it was created.
fn ensure_lock_dir(config: &Config) -> Result<bool> {
    if config.lock_dir.is_dir() {
        return Ok(false);
    }

    DirBuilder::new()
        .recursive(true)
        .mode(LOCK_DIR_MODE)
        .create(&config.lock_dir)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => OpgateError::PermissionDenied {
                path: config.lock_dir.clone(),
            },
            _ => OpgateError::Io {
                path: config.lock_dir.clone(),
                source: e,
            },
        })?;
    tracing::info!(path = %config.lock_dir.display(), "lock directory created");
    Ok(true)
}

/// Create the lock file by probing it. Returns whether it was created.
///
/// If someone holds the gate the file already exists and the probe is
/// simply contended.
fn ensure_lock_file(config: &Config) -> Result<bool> {
    let existed = config.lock_path().exists();
    let mut lock = ProcessLock::new(config.lock_path());
    if lock.try_acquire()? {
        lock.release()?;
    }
    Ok(!existed)
}
