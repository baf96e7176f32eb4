//! CLI argument parsing for opgate.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// opgate: run fleet-mutating commands one operator at a time.
///
/// A shared lock directory holds an advisory lock file and a holder record:
/// - only one `opgate run` can hold the gate at a time
/// - contenders see who holds it and for how long, and may retry
/// - a hard time limit ends any run that waits or works too long
#[derive(Parser, Debug)]
#[command(name = "opgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file (defaults to $OPGATE_CONFIG, then /etc/opgate/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the lock directory from the config.
    #[arg(long, global = true, value_name = "DIR")]
    pub lock_dir: Option<PathBuf>,

    /// Print debug diagnostics to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for opgate.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire the gate and run a command while holding it.
    ///
    /// Without a command after `--`, the `command` from the config is used.
    Run(RunArgs),

    /// Show who holds the gate and for how long.
    ///
    /// The lock is probed by taking it and releasing it at once. A `run` that
    /// makes its only attempt in that instant (`--non-interactive` or
    /// `--max-attempts 1`) reports contention, so avoid polling `status` in a
    /// tight loop next to such runs.
    Status(StatusArgs),

    /// Create the lock directory and lock file.
    ///
    /// Safe to run more than once.
    Init,
}

/// Arguments for the `run` command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Number of attempts before giving up.
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Seconds to wait between attempts.
    #[arg(long, value_name = "SECS")]
    pub retry_wait: Option<u64>,

    /// Total time limit in seconds, covering waiting and the command itself.
    #[arg(long, value_name = "SECS")]
    pub time_limit: Option<u64>,

    /// Never ask to retry; contention aborts at once.
    #[arg(long)]
    pub non_interactive: bool,

    /// Acquire the gate and print the command instead of running it.
    #[arg(long)]
    pub dry_run: bool,

    /// Command to run while holding the gate.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Arguments for the `status` command.
#[derive(Args, Debug, Default)]
pub struct StatusArgs {
    /// Print machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
