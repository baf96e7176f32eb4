//! Error types for the opgate CLI.
//!
//! Uses thiserror for derive macros. Configuration-level failures are kept
//! apart from the acquisition outcomes so that a missing lock directory is
//! never mistaken for another operator holding the gate.

use crate::exit_codes;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for opgate operations.
#[derive(Error, Debug)]
pub enum OpgateError {
    /// User provided invalid arguments.
    #[error("{0}")]
    UserError(String),

    /// The configuration file is unreadable or holds invalid values.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The directory that should contain the lock or holder file is missing.
    #[error(
        "Configuration error: lock directory '{}' does not exist (run `opgate init` or fix lock_dir)",
        path.display()
    )]
    PathUnavailable { path: PathBuf },

    /// The lock or holder file cannot be opened or created.
    #[error("Configuration error: permission denied on '{}'", path.display())]
    PermissionDenied { path: PathBuf },

    /// Any other filesystem failure on the lock or holder file.
    #[error("Configuration error: I/O failure on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every allowed attempt found the gate held by someone else.
    #[error("Failed to acquire lock after {attempts} attempts")]
    AttemptsExhausted { attempts: u32 },

    /// The operator answered something other than Y/YES, or no operator was available.
    #[error("Lock is held by another operator and retry was declined")]
    OperatorDeclined,

    /// The current user is not in the group required to run protected work.
    #[error("User '{user}' must be a member of the '{group}' group to run this program")]
    NotAuthorized { user: String, group: String },

    /// The protected command ran and failed.
    #[error("Command '{command}' exited with status {code}")]
    WorkFailed { command: String, code: i32 },
}

impl OpgateError {
    /// Build the right variant for a filesystem error on one of the gate's paths.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => OpgateError::PathUnavailable {
                path: path.parent().map(PathBuf::from).unwrap_or(path),
            },
            std::io::ErrorKind::PermissionDenied => OpgateError::PermissionDenied { path },
            _ => OpgateError::Io { path, source },
        }
    }

    /// Whether this error stems from deployment or configuration rather than contention.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            OpgateError::ConfigError(_)
                | OpgateError::PathUnavailable { .. }
                | OpgateError::PermissionDenied { .. }
                | OpgateError::Io { .. }
        )
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            OpgateError::WorkFailed { code, .. } if (1..=255).contains(code) => *code,
            _ => exit_codes::FAILURE,
        }
    }
}

/// Result type alias for opgate operations.
pub type Result<T> = std::result::Result<T, OpgateError>;
