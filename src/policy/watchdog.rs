//! Process-wide deadline watchdog.
//!
//! The watchdog is a timer thread that runs an expiry action when the
//! deadline passes before it is disarmed. In production that action ends the
//! whole process: the main thread may be parked in a blocking stdin read with
//! no interrupt point, so cooperative cancellation is not an option.
//!
//! The main thread and the watchdog share nothing but a channel. Disarming
//! sends on it (or drops the sender); the timer thread treats either as
//! "stand down".

use crate::error::{OpgateError, Result};
use crate::exit_codes;
use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// What to do when the deadline expires.
pub type ExpiryAction = Box<dyn FnOnce() + Send + 'static>;

/// An armed deadline. Dropping it disarms it.
#[derive(Debug)]
pub struct Watchdog {
    cancel: Option<Sender<()>>,
}

impl Watchdog {
    /// Start the timer. `on_expiry` runs on the watchdog thread if `limit`
    /// elapses before [`Watchdog::disarm`].
    pub fn arm(limit: Duration, on_expiry: ExpiryAction) -> Result<Self> {
        let (cancel, cancelled) = mpsc::channel::<()>();

        thread::Builder::new()
            .name("opgate-watchdog".to_string())
            .spawn(move || match cancelled.recv_timeout(limit) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(limit_secs = limit.as_secs_f64(), "deadline expired");
                    on_expiry();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!("watchdog disarmed");
                }
            })
            .map_err(|e| OpgateError::UserError(format!("failed to start watchdog: {}", e)))?;

        tracing::debug!(limit_secs = limit.as_secs_f64(), "watchdog armed");
        Ok(Self {
            cancel: Some(cancel),
        })
    }

    /// Cancel the deadline.
    pub fn disarm(mut self) {
        self.cancel_timer();
    }

    fn cancel_timer(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            // The timer thread may already be gone; nothing to do then.
            let _ = cancel.send(());
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

/// Notice printed when the deadline ends the process.
pub fn deadline_message(limit: Duration) -> String {
    format!(
        "Time's up! This program has a time limit of {:.2} minutes.",
        limit.as_secs_f64() / 60.0
    )
}

/// Expiry action that prints the deadline notice and exits immediately with
/// [`exit_codes::DEADLINE_EXCEEDED`]. No destructors run; the kernel drops
/// the `flock` when the descriptor closes at exit.
pub fn terminate_process(limit: Duration) -> ExpiryAction {
    Box::new(move || {
        eprintln!();
        eprintln!("{}", deadline_message(limit));
        eprintln!("Exiting program...");
        let _ = std::io::stderr().flush();
        let _ = std::io::stdout().flush();
        std::process::exit(exit_codes::DEADLINE_EXCEEDED);
    })
}
