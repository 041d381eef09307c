//! Group lock metadata structures and utilities.

use crate::error::{Result, TaskLockError};
use crate::record::get_owner_string;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Metadata written into the group lock file by the transaction holding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupLockMetadata {
    /// Owner of the lock (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the lock holder (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the transaction began (RFC3339).
    pub created_at: DateTime<Utc>,
}

impl GroupLockMetadata {
    /// Create new lock metadata with the current timestamp.
    pub fn new() -> Self {
        Self {
            owner: get_owner_string(),
            pid: Some(std::process::id()),
            created_at: Utc::now(),
        }
    }

    /// Parse lock metadata from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            TaskLockError::StoreTransient(format!(
                "failed to read group lock file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            TaskLockError::StoreTransient(format!(
                "failed to parse group lock file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Serialize lock metadata to JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            TaskLockError::StoreTransient(format!("failed to serialize group lock metadata: {}", e))
        })
    }

    /// Whether `other` describes the same acquisition of the lock.
    pub fn same_holder(&self, other: &GroupLockMetadata) -> bool {
        self.created_at == other.created_at && self.pid == other.pid && self.owner == other.owner
    }

    /// Calculate the age of the lock.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// A transaction that has held the group lock longer than `threshold`
    /// is assumed to belong to a crashed process.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.age() > threshold
    }
}

impl Default for GroupLockMetadata {
    fn default() -> Self {
        Self::new()
    }
}
