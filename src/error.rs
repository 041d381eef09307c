//! Error types for tasklock.
//!
//! Uses thiserror for derive macros. Each variant corresponds to one failure
//! mode of the lock protocol and maps to a process exit code for the CLI.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for tasklock operations.
#[derive(Error, Debug)]
pub enum TaskLockError {
    /// Two live records were written within the settle window of each other,
    /// so the winner cannot be determined.
    #[error("too close to call: two locks were created within the settle time of each other")]
    Contention,

    /// The durable store failed (commit conflict, I/O, backend error).
    #[error("store failure: {0}")]
    StoreTransient(String),

    /// A store call was made against a transaction that already ended.
    #[error("transaction was no longer active")]
    NoActiveTransaction,

    /// Two lock ids claimed the identical cache timestamp.
    #[error("cache: collision of lock timestamps")]
    CacheCollision,

    /// The cache retry budget was exhausted.
    #[error("cache: unable to record lock due to contention")]
    CacheHotEntry,

    /// The cache backend failed.
    #[error("cache failure: {0}")]
    Cache(String),

    /// Post-commit verification found a missing or different holder.
    #[error("lock verification failed: {0}")]
    Verification(String),

    /// The active record belongs to a different lock id than the caller's.
    #[error("lock is held by '{actual}', expected '{expected}'")]
    LockOverwritten { expected: String, actual: String },

    /// The lock could not be obtained or renewed; the call already backed
    /// off and may be retried.
    #[error("{0}")]
    NotAcquired(String),

    /// Invalid configuration or arguments.
    #[error("{0}")]
    UserError(String),
}

impl TaskLockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskLockError::UserError(_) => exit_codes::USER_ERROR,
            TaskLockError::StoreTransient(_) | TaskLockError::NoActiveTransaction => {
                exit_codes::STORE_FAILURE
            }
            TaskLockError::Contention
            | TaskLockError::CacheCollision
            | TaskLockError::CacheHotEntry
            | TaskLockError::Cache(_)
            | TaskLockError::Verification(_)
            | TaskLockError::LockOverwritten { .. }
            | TaskLockError::NotAcquired(_) => exit_codes::LOCK_FAILURE,
        }
    }

    /// Whether the caller may simply retry the whole operation.
    ///
    /// A cache collision is not retryable with the same lock id; the caller
    /// has to start a fresh attempt with a new one.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskLockError::Contention
                | TaskLockError::StoreTransient(_)
                | TaskLockError::NoActiveTransaction
                | TaskLockError::CacheHotEntry
                | TaskLockError::Cache(_)
                | TaskLockError::Verification(_)
                | TaskLockError::NotAcquired(_)
        )
    }
}

/// Result type alias for tasklock operations.
pub type Result<T> = std::result::Result<T, TaskLockError>;
