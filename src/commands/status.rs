//! Implementation of the `opgate status` command.
//!
//! Reports whether the gate is held right now and what the holder record
//! says. The lock is probed with a try-acquire that is released at once, so
//! running `status` never blocks a real acquisition for longer than that.
//!
//! That window is still visible: a `run` whose only attempt lands inside it
//! sees contention and gives up. flock offers no read-only test, and a shared
//! lock would conflict with `run` in the same way.

use crate::cli::StatusArgs;
use crate::config::Config;
use crate::error::{OpgateError, Result};
use crate::identity;
use crate::locks::{self, HolderRecord, HolderRegistry, ProcessLock, format_elapsed};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Snapshot printed by `status`.
#[derive(Debug, Serialize)]
struct StatusReport {
    lock_path: String,
    held: bool,
    holder: HolderRecord,
    elapsed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stale: Option<String>,
}

/// Execute the `opgate status` command.
pub fn cmd_status(config: &Config, args: StatusArgs) -> Result<()> {
    let mut lock = ProcessLock::new(config.lock_path());
    let held = locks::is_locked(&mut lock)?;
    tracing::debug!(path = %lock.path().display(), held, "lock probed");
    let record = HolderRegistry::new(config.holder_path()).read();

    let report = build_report(config, held, record, locks::now());

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| OpgateError::UserError(format!("failed to render status: {}", e)))?;
        println!("{}", json);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn build_report(
    config: &Config,
    held: bool,
    holder: HolderRecord,
    now: NaiveDateTime,
) -> StatusReport {
    // A free gate keeps its last record, which says nothing about staleness.
    let stale = if held {
        holder.stale_reason(now, config.stale_after(), &identity::current_hostname())
    } else {
        None
    };

    StatusReport {
        lock_path: config.lock_path().display().to_string(),
        held,
        elapsed: format_elapsed(holder.elapsed_at(now)),
        holder,
        stale,
    }
}

fn print_report(report: &StatusReport) {
    println!("Gate Status");
    println!("===========");
    println!();
    println!("Lock:   {}", report.lock_path);

    if !report.held {
        println!("State:  free");
        if !report.holder.is_unknown() {
            println!("Last holder: {}", report.holder);
        }
        return;
    }

    println!("State:  held");
    println!("Holder: {}", report.holder);
    println!("Time lapsed: {}", report.elapsed);
    if let Some(reason) = &report.stale {
        println!();
        println!("Warning: holder looks stale ({})", reason);
    }
}
