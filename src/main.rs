//! opgate: single-operator execution gate for fleet-mutating CLI tools.
//!
//! This is the main entry point for the `opgate` CLI. It parses arguments,
//! sets up logging and interrupt handling, dispatches to the appropriate
//! command handler, and handles errors with proper exit codes.

pub mod child;
mod cli;
mod commands;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod identity;
pub mod interrupt;
pub mod locks;
pub mod logging;
pub mod policy;

#[cfg(test)]
mod test_support;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    logging::init_tracing(cli.verbose);

    // Signals must be blocked before the watchdog thread exists.
    if let Err(err) = interrupt::install() {
        eprintln!("Error: {}", err);
        return ExitCode::from(err.exit_code() as u8);
    }

    match commands::dispatch(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
