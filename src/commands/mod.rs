//! Command implementations for opgate.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command works from the same resolved [`Config`].

mod init;
mod run;
mod status;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::error::Result;
use std::path::Path;

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. The config is
/// resolved once here, with `--lock-dir` applied on top.
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.lock_dir.as_deref())?;

    match cli.command {
        Command::Run(args) => run::cmd_run(config, args),
        Command::Status(args) => status::cmd_status(&config, args),
        Command::Init => init::cmd_init(&config),
    }
}

/// Resolve the effective config and apply global overrides.
fn load_config(explicit: Option<&Path>, lock_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::resolve(explicit)?;
    if let Some(dir) = lock_dir {
        config.lock_dir = dir.to_path_buf();
    }
    tracing::debug!(lock_dir = %config.lock_dir.display(), "config resolved");
    Ok(config)
}
