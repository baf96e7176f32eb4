//! Exit code constants for the opgate CLI.
//!
//! - 0: Success (also used when the operator interrupts with Ctrl-C)
//! - 1: Failure (attempt limit exceeded, operator declined, configuration error)
//! - 124: The global deadline expired and the watchdog terminated the process
//!
//! `opgate run` additionally propagates the exit code of a failing child command.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Attempt limit exceeded, operator declined, bad configuration or arguments.
pub const FAILURE: i32 = 1;

/// The watchdog fired before the gate was released.
pub const DEADLINE_EXCEEDED: i32 = 124;

/// Base added to a signal number when a child command is killed by a signal.
pub const SIGNAL_BASE: i32 = 128;
