//! RAII lock guard implementation.

use super::ExclusiveLock;
use crate::error::Result;

/// Scoped ownership of an acquired lock.
///
/// When dropped, the lock is released. This covers early returns, `?`
/// propagation and unwinding panics from the protected work. If the release
/// fails during drop, a warning is printed but no panic occurs.
#[derive(Debug)]
pub struct LockGuard<'a, L: ExclusiveLock> {
    lock: &'a mut L,
    released: bool,
}

impl<'a, L: ExclusiveLock> LockGuard<'a, L> {
    /// Wrap a lock that the caller has just acquired.
    pub(crate) fn new(lock: &'a mut L) -> Self {
        Self {
            lock,
            released: false,
        }
    }

    /// Manually release the lock and surface any error.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.release()
    }
}

impl<L: ExclusiveLock> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.lock.release()
        {
            tracing::warn!(error = %e, "lock release failed");
            eprintln!("Warning: failed to release lock: {}", e);
        }
    }
}
