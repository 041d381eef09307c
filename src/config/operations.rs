//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{Result, TaskLockError};
use crate::logging::parse_log_level;
use chrono::Duration;
use std::path::Path;

/// Upper bound for `min_settle_ms` and `max_settle_ms` (one hour).
pub const MAX_SETTLE_MS: u64 = 60 * 60 * 1000;

/// Upper bound for `stale_record_window_hours` (ten years).
pub const MAX_STALE_RECORD_WINDOW_HOURS: u32 = 10 * 365 * 24;

/// Upper bound for `cache_prune_window_secs` (one week).
pub const MAX_CACHE_PRUNE_WINDOW_SECS: u32 = 7 * 24 * 60 * 60;

impl Config {
    /// Load config from a YAML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(TaskLockError::UserError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            TaskLockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).map_err(|e| {
            TaskLockError::UserError(format!("failed to parse config YAML: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            TaskLockError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `min_settle_ms` must be positive
    /// - `max_settle_ms` must be at least `min_settle_ms`
    /// - windows and the cache retry limit must be positive
    /// - settle and window values must not exceed their `MAX_*` bounds
    /// - `logging.level` must name a tracing level
    pub fn validate(&self) -> Result<()> {
        if self.min_settle_ms == 0 {
            return Err(TaskLockError::UserError(
                "config validation failed: min_settle_ms must be greater than 0".to_string(),
            ));
        }

        if self.max_settle_ms < self.min_settle_ms {
            return Err(TaskLockError::UserError(format!(
                "config validation failed: max_settle_ms ({}) must not be less than min_settle_ms ({})",
                self.max_settle_ms, self.min_settle_ms
            )));
        }

        if self.max_settle_ms > MAX_SETTLE_MS {
            return Err(TaskLockError::UserError(format!(
                "config validation failed: settle times must not exceed {} ms",
                MAX_SETTLE_MS
            )));
        }

        if self.stale_record_window_hours == 0 {
            return Err(TaskLockError::UserError(
                "config validation failed: stale_record_window_hours must be greater than 0"
                    .to_string(),
            ));
        }

        if self.stale_record_window_hours > MAX_STALE_RECORD_WINDOW_HOURS {
            return Err(TaskLockError::UserError(format!(
                "config validation failed: stale_record_window_hours must not exceed {}",
                MAX_STALE_RECORD_WINDOW_HOURS
            )));
        }

        if self.cache_prune_window_secs == 0 {
            return Err(TaskLockError::UserError(
                "config validation failed: cache_prune_window_secs must be greater than 0"
                    .to_string(),
            ));
        }

        if self.cache_prune_window_secs > MAX_CACHE_PRUNE_WINDOW_SECS {
            return Err(TaskLockError::UserError(format!(
                "config validation failed: cache_prune_window_secs must not exceed {}",
                MAX_CACHE_PRUNE_WINDOW_SECS
            )));
        }

        if self.cache_retry_limit == 0 {
            return Err(TaskLockError::UserError(
                "config validation failed: cache_retry_limit must be greater than 0".to_string(),
            ));
        }

        parse_log_level(&self.logging.level)?;

        Ok(())
    }

    pub fn min_settle(&self) -> Duration {
        Duration::milliseconds(self.min_settle_ms as i64)
    }

    pub fn max_settle(&self) -> Duration {
        Duration::milliseconds(self.max_settle_ms as i64)
    }

    pub fn stale_record_window(&self) -> Duration {
        Duration::hours(self.stale_record_window_hours as i64)
    }

    pub fn cache_prune_window(&self) -> Duration {
        Duration::seconds(self.cache_prune_window_secs as i64)
    }
}
