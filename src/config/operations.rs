//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{OpgateError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "OPGATE_CONFIG";

/// Config file used when neither `--config` nor `OPGATE_CONFIG` is given.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/opgate/config.yaml";

impl Config {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            OpgateError::ConfigError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Locate and load the effective config.
    ///
    /// Order: explicit path, then `$OPGATE_CONFIG`, then the system config if it
    /// exists, then built-in defaults. An explicitly named file must exist.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            tracing::debug!(path = %path.display(), "loading config from --config");
            return Self::load(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(path);
            tracing::debug!(path = %path.display(), "loading config from {}", CONFIG_ENV_VAR);
            return Self::load(&path);
        }

        let system = Path::new(SYSTEM_CONFIG_PATH);
        if system.is_file() {
            tracing::debug!(path = %system.display(), "loading system config");
            return Self::load(system);
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| OpgateError::ConfigError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    #[cfg(test)]
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            OpgateError::ConfigError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `max_attempts` and `time_limit_secs` must be positive
    /// - `lock_file` and `holder_file` must be plain, distinct file names
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(OpgateError::ConfigError(
                "config validation failed: max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.time_limit_secs == 0 {
            return Err(OpgateError::ConfigError(
                "config validation failed: time_limit_secs must be greater than 0".to_string(),
            ));
        }

        for (field, name) in [("lock_file", &self.lock_file), ("holder_file", &self.holder_file)] {
            if name.is_empty() || name == "." || name == ".." || name.contains('/') {
                return Err(OpgateError::ConfigError(format!(
                    "config validation failed: {} must be a plain file name (found '{}')",
                    field, name
                )));
            }
        }

        if self.lock_file == self.holder_file {
            return Err(OpgateError::ConfigError(
                "config validation failed: lock_file and holder_file must differ".to_string(),
            ));
        }

        if let Some(group) = &self.required_group
            && group.trim().is_empty()
        {
            return Err(OpgateError::ConfigError(
                "config validation failed: required_group must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Path of the lock token file.
    pub fn lock_path(&self) -> PathBuf {
        self.lock_dir.join(&self.lock_file)
    }

    /// Path of the holder record file.
    pub fn holder_path(&self) -> PathBuf {
        self.lock_dir.join(&self.holder_file)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait_secs)
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(u64::from(self.stale_after_minutes) * 60)
    }
}
