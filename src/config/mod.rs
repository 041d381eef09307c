//! Configuration model for tasklock.
//!
//! This module defines the Config struct that represents a `tasklock.yaml`
//! file. It supports forward-compatible YAML parsing (unknown fields are
//! ignored), defaults for every field, and validation of config values.
//!
//! The settle windows encode assumptions about a particular backing store's
//! consistency window, which is why none of them are hardcoded in the lock
//! manager.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use operations::{MAX_CACHE_PRUNE_WINDOW_SECS, MAX_SETTLE_MS, MAX_STALE_RECORD_WINDOW_HOURS};
pub use types::LoggingConfig;
