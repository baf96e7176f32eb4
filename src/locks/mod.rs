//! Locking subsystem for opgate.
//!
//! Two files in one directory make up the gate:
//! - the lock file (`__lock_file__`), used only as an `flock(2)` token
//! - the holder record (`__pid_file__`), naming who holds the gate and since when
//!
//! # Exclusion
//!
//! Exclusion comes entirely from the advisory lock on the lock file. Its
//! content is irrelevant and it is never deleted. The kernel releases the lock
//! when the holder's descriptor closes, so a crashed holder cannot leave the
//! gate stuck.
//!
//! # Holder Record
//!
//! Written by the new holder right after acquisition and before any protected
//! work. It has no authority: a missing or garbled record only degrades the
//! contention report to `unknown`.
//!
//! # RAII Guards
//!
//! An acquired lock is wrapped in a [`LockGuard`] so that it is released on
//! every exit path of the protected work.

mod guard;
mod holder;
mod process_lock;

#[cfg(test)]
mod tests;

use crate::error::Result;

pub use guard::LockGuard;
pub use holder::{
    HOLDER_FILE_MODE, HolderRecord, HolderRegistry, TIMESTAMP_FORMAT, format_elapsed, now,
};
pub use process_lock::{LOCK_FILE_MODE, ProcessLock};

/// A non-blocking exclusive lock.
///
/// Blocking, retrying and reporting are layered on top by the acquisition
/// policy; implementations only ever try once.
pub trait ExclusiveLock {
    /// Try once. `Ok(false)` means another holder has the lock.
    fn try_acquire(&mut self) -> Result<bool>;

    /// Release if held. Must be a no-op when nothing is held.
    fn release(&mut self) -> Result<()>;
}

/// Report whether someone currently holds the lock at `lock`.
///
/// Probes with a throwaway try-acquire and releases immediately on success.
pub fn is_locked(lock: &mut ProcessLock) -> Result<bool> {
    if lock.is_held() {
        return Ok(true);
    }
    let acquired = lock.try_acquire()?;
    if acquired {
        lock.release()?;
    }
    Ok(!acquired)
}
