//! Configuration types and defaults for tasklock.

use serde::{Deserialize, Serialize};

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace/debug/info/warn/error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions for serde
pub(crate) fn default_min_settle_ms() -> u64 {
    1000
}
pub(crate) fn default_max_settle_ms() -> u64 {
    3000
}
pub(crate) fn default_stale_record_window_hours() -> u32 {
    24
}
pub(crate) fn default_cache_prune_window_secs() -> u32 {
    300
}
pub(crate) fn default_cache_retry_limit() -> u32 {
    10
}
pub(crate) fn default_log_level() -> String {
    "info".to_string()
}
