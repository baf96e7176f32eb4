//! Config struct definition and default implementation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the gate.
///
/// This struct represents the contents of `config.yaml`. Every field has a
/// default; unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Paths
    // =========================================================================
    /// Directory holding the lock file and the holder record.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// File name of the lock token inside `lock_dir`.
    #[serde(default = "default_lock_file")]
    pub lock_file: String,

    /// File name of the holder record inside `lock_dir`.
    #[serde(default = "default_holder_file")]
    pub holder_file: String,

    // =========================================================================
    // Acquisition
    // =========================================================================
    /// Number of try-acquire calls before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds to sleep between attempts.
    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,

    /// Total wall-clock budget in seconds before the watchdog kills the process.
    #[serde(default = "default_time_limit_secs")]
    pub time_limit_secs: u64,

    /// Whether the operator may be asked to retry. When false, contention aborts.
    #[serde(default = "default_true")]
    pub interactive: bool,

    // =========================================================================
    // Reporting
    // =========================================================================
    /// Minutes after which a holder is reported as stale.
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: u32,

    // =========================================================================
    // Protected work
    // =========================================================================
    /// Local group the operator must belong to (unset disables the check).
    #[serde(default)]
    pub required_group: Option<String>,

    /// Default command for `opgate run` when none is given on the command line.
    #[serde(default)]
    pub command: Option<String>,

    /// Acquire the gate but only print the command instead of running it.
    #[serde(default)]
    pub dry_run: bool,
}

// Default value functions for serde
fn default_lock_dir() -> PathBuf {
    PathBuf::from("/var/lock/opgate")
}
fn default_lock_file() -> String {
    "__lock_file__".to_string()
}
fn default_holder_file() -> String {
    "__pid_file__".to_string()
}
fn default_max_attempts() -> u32 {
    4
}
fn default_retry_wait_secs() -> u64 {
    5
}
fn default_time_limit_secs() -> u64 {
    600
}
fn default_stale_after_minutes() -> u32 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            lock_file: default_lock_file(),
            holder_file: default_holder_file(),
            max_attempts: default_max_attempts(),
            retry_wait_secs: default_retry_wait_secs(),
            time_limit_secs: default_time_limit_secs(),
            interactive: default_true(),
            stale_after_minutes: default_stale_after_minutes(),
            required_group: None,
            command: None,
            dry_run: false,
        }
    }
}
