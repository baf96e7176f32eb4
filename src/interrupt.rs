//! Terminal interrupt handling.
//!
//! `SIGINT` and `SIGTERM` are blocked in the calling thread and picked up
//! synchronously by a dedicated thread. Every thread spawned afterwards
//! inherits the mask, so the signals are only ever seen by that thread.
//! Child processes started with `std::process::Command` get a cleared mask.
//!
//! The signal is forwarded to the protected command's process group, and the
//! process exits only once that group is gone. Exiting drops the `flock` with
//! the descriptor, so the gate is freed without running any cleanup code.

use crate::child::{self, STOP_GRACE};
use crate::error::{OpgateError, Result};
use crate::exit_codes;
use nix::sys::signal::{SigSet, Signal};
use std::io::Write;
use std::thread;

/// Install the handler. Must run before any other thread is spawned.
pub fn install() -> Result<()> {
    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);

    signals.thread_block().map_err(|e| {
        OpgateError::UserError(format!("failed to block interrupt signals: {}", e))
    })?;

    thread::Builder::new()
        .name("opgate-interrupt".to_string())
        .spawn(move || match signals.wait() {
            Ok(signal) => {
                tracing::info!(signal = %signal, "interrupt received");
                let _ = std::io::stdout().flush();
                eprintln!();
                eprintln!("Process interrupted by user. Exiting program...");
                if child::ACTIVE.stop(signal, STOP_GRACE) {
                    tracing::info!("protected command stopped");
                }
                std::process::exit(exit_code_for(signal));
            }
            Err(e) => tracing::warn!(error = %e, "waiting for interrupt signals failed"),
        })
        .map_err(|e| {
            OpgateError::UserError(format!("failed to start interrupt handler: {}", e))
        })?;

    Ok(())
}

/// `SIGINT` is an operator's choice and exits cleanly; anything else reports
/// the conventional `128 + signal`.
fn exit_code_for(signal: Signal) -> i32 {
    match signal {
        Signal::SIGINT => exit_codes::SUCCESS,
        other => exit_codes::SIGNAL_BASE + other as i32,
    }
}
