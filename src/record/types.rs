//! Lock key and record definitions.

use super::lock_id::LockId;
use super::task_type::TaskType;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Group key shared by every lock record of a deployment.
pub const GROUP_KEY: &str = "TASK_LOCKS";

/// One logical exclusive resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey {
    /// The resource the task works on (e.g. a form or table id).
    pub resource_id: String,

    /// The kind of task.
    pub task_type: TaskType,
}

impl LockKey {
    pub fn new(resource_id: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            resource_id: resource_id.into(),
            task_type,
        }
    }

    /// Key of this lock's entry in the fast cache.
    pub fn cache_key(&self) -> String {
        format!("{}@{}", self.resource_id, self.task_type.name())
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource_id, self.task_type)
    }
}

/// Store-level key of a single record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Store key of this record.
    pub key: RecordKey,

    /// Id of the acquisition attempt that wrote the record.
    pub lock_id: LockId,

    /// Resource the lock covers.
    pub resource_id: String,

    /// Kind of task the lock covers.
    pub task_type: TaskType,

    /// The lease ends at this instant.
    pub expires_at: DateTime<Utc>,
}

/// How a record looks at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Not yet expired.
    Live,
    /// Expired but within the stale window; left alone by cleanup unless it
    /// is the caller's own record.
    Expired,
    /// Expired for longer than the stale window; any party may delete it.
    Stale,
}

impl LockRecord {
    /// Create a new record for `lock_id` that expires one task timeout
    /// after `now`.
    pub fn new(lock_id: LockId, key: &LockKey, now: DateTime<Utc>) -> Self {
        Self {
            key: RecordKey::generate(),
            lock_id,
            resource_id: key.resource_id.clone(),
            task_type: key.task_type,
            expires_at: now + key.task_type.lock_timeout(),
        }
    }

    pub fn lock_key(&self) -> LockKey {
        LockKey::new(self.resource_id.clone(), self.task_type)
    }

    /// Whether this record belongs to `key`.
    pub fn matches(&self, key: &LockKey) -> bool {
        self.resource_id == key.resource_id && self.task_type == key.task_type
    }

    /// Expired once `now` is strictly after `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Expired for longer than `stale_window`. A window reaching past the
    /// representable range never makes a record stale.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_window: Duration) -> bool {
        self.expires_at
            .checked_add_signed(stale_window)
            .is_some_and(|limit| limit < now)
    }

    pub fn state(&self, now: DateTime<Utc>, stale_window: Duration) -> RecordState {
        if self.is_stale(now, stale_window) {
            RecordState::Stale
        } else if self.is_expired(now) {
            RecordState::Expired
        } else {
            RecordState::Live
        }
    }

    /// Extend the lease to one task timeout after `now`.
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        self.expires_at = now + self.task_type.lock_timeout();
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            crate::error::TaskLockError::StoreTransient(format!(
                "failed to serialize lock record: {}",
                e
            ))
        })
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordState::Live => write!(f, "live"),
            RecordState::Expired => write!(f, "expired"),
            RecordState::Stale => write!(f, "STALE"),
        }
    }
}
