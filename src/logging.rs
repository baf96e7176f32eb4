//! Diagnostic logging setup.
//!
//! Operator-facing output goes straight to stdout/stderr. `tracing` events are
//! diagnostics only and are written to stderr, filtered by `RUST_LOG`.

use tracing_subscriber::EnvFilter;

fn default_filter(verbose: bool) -> &'static str {
    if verbose { "opgate=debug,warn" } else { "warn" }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose` when set.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();

    if let Err(e) = result {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }
}
