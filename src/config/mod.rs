//! Configuration model for opgate.
//!
//! This module defines the Config struct that represents `config.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.

mod model;
mod operations;


// Re-export public API
pub use model::Config;
pub use operations::{CONFIG_ENV_VAR, SYSTEM_CONFIG_PATH};
