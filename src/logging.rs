//! Structured logging with tracing.
//!
//! The lock manager only emits `tracing` events; installing a subscriber is
//! left to the embedding process. The CLI calls [`init_logging`].

use crate::config::LoggingConfig;
use crate::error::{Result, TaskLockError};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the configured filter.
pub const LOG_ENV_VAR: &str = "TASKLOCK_LOG";

/// Initialize logging with the provided configuration.
///
/// Calling this more than once is harmless: a second subscriber is simply
/// not installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(%level, json = config.json, "logging initialized");
    }
    Ok(())
}

/// Parse log level string to tracing Level.
pub fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(TaskLockError::UserError(format!(
            "invalid log level: {}. Use trace, debug, info, warn, or error",
            level
        ))),
    }
}
