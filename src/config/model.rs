//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for the lock manager.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Settle windows
    // =========================================================================
    /// Post-commit stabilization wait, and the minimum distance between two
    /// live records for the earlier one to be declared the winner.
    #[serde(default = "default_min_settle_ms")]
    pub min_settle_ms: u64,

    /// Backoff after a rollback or failed commit.
    #[serde(default = "default_max_settle_ms")]
    pub max_settle_ms: u64,

    /// Wait `min_settle_ms` before verifying even when the store claims
    /// read-after-write consistency.
    #[serde(default)]
    pub force_settle_wait: bool,

    // =========================================================================
    // Garbage collection
    // =========================================================================
    /// Hours past expiry after which any record may be deleted by cleanup.
    #[serde(default = "default_stale_record_window_hours")]
    pub stale_record_window_hours: u32,

    // =========================================================================
    // Fast cache
    // =========================================================================
    /// Seconds after which a cache candidate entry is pruned.
    #[serde(default = "default_cache_prune_window_secs")]
    pub cache_prune_window_secs: u32,

    /// Maximum read-modify-write attempts against one cache entry.
    #[serde(default = "default_cache_retry_limit")]
    pub cache_retry_limit: u32,

    // =========================================================================
    // Logging
    // =========================================================================
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_settle_ms: default_min_settle_ms(),
            max_settle_ms: default_max_settle_ms(),
            force_settle_wait: false,
            stale_record_window_hours: default_stale_record_window_hours(),
            cache_prune_window_secs: default_cache_prune_window_secs(),
            cache_retry_limit: default_cache_retry_limit(),
            logging: LoggingConfig::default(),
        }
    }
}
