//! Acquisition policy: bounded retry, contention feedback and a hard deadline.
//!
//! # State machine
//!
//! ```text
//! Idle -> Attempting -> Locked -> Released
//!             |  ^
//!             v  |
//!       WaitingForRetry
//!             |
//!             v
//!         GivingUp -> Aborted
//! ```
//!
//! Independently of the state, the watchdog may end the process when the
//! total time budget runs out (see [`watchdog`]).
//!
//! # Guarantees
//!
//! - `try_acquire` is called at most `max_attempts` times per run.
//! - The holder record is written after acquisition and before the protected
//!   work starts.
//! - The protected work runs at most once, and the lock is released on every
//!   exit path, including errors and panics.
//! - Filesystem failures other than contention abort at once and are never
//!   retried.

pub mod prompt;
pub mod watchdog;


use crate::config::Config;
use crate::error::{OpgateError, Result};
use crate::identity;
use crate::locks::{self, ExclusiveLock, HolderRegistry, LockGuard, format_elapsed};
use chrono::NaiveDateTime;
use std::time::Duration;

pub use prompt::{
    LineOperator, Operator, RETRY_PROMPT, StdinOperator, is_affirmative, stdin_operator,
};
pub use watchdog::{ExpiryAction, Watchdog, deadline_message, terminate_process};

const HORIZ_LINE: &str =
    "----------------------------------------------------------------------------------------";

/// Knobs for one acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySettings {
    pub max_attempts: u32,
    pub retry_wait: Duration,
    pub time_limit: Duration,
    pub interactive: bool,
    /// Age after which a contending holder is flagged as possibly stale.
    pub stale_after: Duration,
}

impl From<&Config> for PolicySettings {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_wait: config.retry_wait(),
            time_limit: config.time_limit(),
            interactive: config.interactive,
            stale_after: config.stale_after(),
        }
    }
}

/// Where the acquisition loop currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    Attempting,
    Locked,
    WaitingForRetry,
    GivingUp,
    Released,
    Aborted,
}

/// One pass through the loop. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionAttempt {
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub wait_between_attempts: Duration,
}

impl AcquisitionAttempt {
    pub fn attempts_remain(&self) -> bool {
        self.attempt_number < self.max_attempts
    }
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

/// Runs protected work behind an exclusive lock.
pub struct AcquisitionPolicy<L: ExclusiveLock, O: Operator> {
    settings: PolicySettings,
    lock: L,
    registry: HolderRegistry,
    operator: O,
    identity: String,
    clock: Clock,
    expiry: Option<ExpiryAction>,
    state: AcquisitionState,
}

impl<L: ExclusiveLock, O: Operator> AcquisitionPolicy<L, O> {
    pub fn new(settings: PolicySettings, lock: L, registry: HolderRegistry, operator: O) -> Self {
        Self {
            settings,
            lock,
            registry,
            operator,
            identity: identity::current_username(),
            clock: Box::new(locks::now),
            expiry: None,
            state: AcquisitionState::Idle,
        }
    }

    /// Name written to the holder record (defaults to the login name).
    #[cfg(test)]
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Source of "now" for the holder record and elapsed-time reports.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replace what happens when the deadline expires.
    ///
    /// Defaults to [`terminate_process`].
    pub fn with_expiry_action(mut self, action: ExpiryAction) -> Self {
        self.expiry = Some(action);
        self
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    #[cfg(test)]
    pub fn lock(&self) -> &L {
        &self.lock
    }

    #[cfg(test)]
    pub fn operator(&self) -> &O {
        &self.operator
    }

    /// Acquire the lock, run `work` once while holding it, then release.
    ///
    /// Errors from `work` are returned after the lock has been released.
    pub fn run<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let expiry = self
            .expiry
            .take()
            .unwrap_or_else(|| terminate_process(self.settings.time_limit));
        let watchdog = Watchdog::arm(self.settings.time_limit, expiry)?;

        let result = match self.acquire() {
            Ok(()) => self.run_locked(work),
            Err(e) => {
                self.state = AcquisitionState::Aborted;
                Err(e)
            }
        };

        watchdog.disarm();
        result
    }

    /// The retry loop. Returns once the lock is held or the run must abort.
    fn acquire(&mut self) -> Result<()> {
        let max_attempts = self.settings.max_attempts;

        for attempt_number in 1..=max_attempts {
            let attempt = AcquisitionAttempt {
                attempt_number,
                max_attempts,
                wait_between_attempts: self.settings.retry_wait,
            };

            self.state = AcquisitionState::Attempting;
            tracing::debug!(attempt = attempt_number, max_attempts, "trying to acquire lock");
            let acquired = self.lock.try_acquire().inspect_err(|e| {
                if e.is_configuration_error() {
                    tracing::error!(error = %e, "lock path unusable, not retrying");
                }
            })?;
            if acquired {
                self.state = AcquisitionState::Locked;
                return Ok(());
            }

            self.report_contention();

            if !attempt.attempts_remain() {
                self.state = AcquisitionState::GivingUp;
                self.operator.notify(&format!(
                    "Failed to acquire lock after {} attempts.",
                    max_attempts
                ));
                self.operator
                    .notify("You have reached the maximum number of attempts. Exiting.");
                return Err(OpgateError::AttemptsExhausted {
                    attempts: max_attempts,
                });
            }

            if !self.settings.interactive || !self.operator.confirm_retry() {
                self.state = AcquisitionState::GivingUp;
                self.operator.notify("Exiting program...");
                return Err(OpgateError::OperatorDeclined);
            }

            self.state = AcquisitionState::WaitingForRetry;
            self.operator.notify(&format!(
                "Retrying in {} seconds...",
                attempt.wait_between_attempts.as_secs()
            ));
            std::thread::sleep(attempt.wait_between_attempts);
        }

        self.state = AcquisitionState::GivingUp;
        Err(OpgateError::AttemptsExhausted {
            attempts: max_attempts,
        })
    }

    /// Write the holder record and run `work` under a scoped guard.
    fn run_locked<T, F>(&mut self, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let guard = LockGuard::new(&mut self.lock);

        if let Err(e) = self.registry.write(&self.identity, (self.clock)()) {
            drop(guard);
            self.state = AcquisitionState::Aborted;
            return Err(e);
        }
        tracing::info!(
            owner = %self.identity,
            record = %self.registry.path().display(),
            "lock acquired"
        );

        let result = work();

        if let Err(e) = guard.release() {
            tracing::warn!(error = %e, "lock release failed after protected work");
            eprintln!("Warning: failed to release lock: {}", e);
        }
        self.state = AcquisitionState::Released;
        tracing::info!(owner = %self.identity, "lock released");

        result
    }

    fn report_contention(&mut self) {
        let record = self.registry.read();
        let now = (self.clock)();
        let elapsed = format_elapsed(record.elapsed_at(now));
        let stale =
            record.stale_reason(now, self.settings.stale_after, &identity::current_hostname());
        tracing::info!(holder = %record, elapsed = %elapsed, stale = ?stale, "lock contended");

        self.operator.notify("");
        self.operator.notify(HORIZ_LINE);
        self.operator.notify(
            "This program is already in use. Only one instance of this program can be run at one time.",
        );
        self.operator.notify(&format!(
            "User '{}' is already running this program. Time lapsed: '{}'",
            record.owner, elapsed
        ));
        if let Some(reason) = stale {
            self.operator.notify(&format!("Warning: holder looks stale ({})", reason));
        }
        self.operator.notify(HORIZ_LINE);
        self.operator.notify("");
    }
}
