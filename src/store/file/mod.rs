//! File-backed durable store.
//!
//! # Layout
//!
//! ```text
//! {root}/TASK_LOCKS/
//!   group.lock          held while a transaction is open
//!   records/{key}.json  one lock record per file
//! ```
//!
//! Transactions are serialized by creating `group.lock` with **create_new**
//! semantics, so at most one process can have a transaction open on the
//! group. Writes are staged in memory and applied on commit with atomic file
//! replacement. Every committed write is visible to the next read, so the
//! store reports strong read-after-write consistency.
//!
//! A group lock older than the stale threshold is assumed to belong to a
//! crashed process and is broken by the next transaction. A transaction
//! whose lock was broken that way fails its commit with
//! [`TaskLockError::NoActiveTransaction`].

mod guard;
mod metadata;
mod record_file;

#[cfg(test)]
mod tests;

use super::{DurableStore, StoreTransaction};
use crate::error::{Result, TaskLockError};
use crate::record::{GROUP_KEY, LockKey, LockRecord, RecordKey};
use chrono::Duration;
use guard::{GroupLockGuard, TryAcquire, break_lock, try_acquire};
use record_file::{remove_record, write_record};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use metadata::GroupLockMetadata;

/// Default age after which a group lock is considered abandoned.
pub const DEFAULT_STALE_GROUP_LOCK_SECS: i64 = 30;

const ACQUIRE_ATTEMPTS: u32 = 50;
const ACQUIRE_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(20);

/// Durable store in a directory of JSON files.
#[derive(Debug, Clone)]
pub struct FileStore {
    group_dir: PathBuf,
    stale_group_lock: Duration,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let group_dir = root.as_ref().join(GROUP_KEY);
        let records_dir = group_dir.join("records");
        fs::create_dir_all(&records_dir).map_err(|e| {
            TaskLockError::StoreTransient(format!(
                "failed to create store directory '{}': {}",
                records_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            group_dir,
            stale_group_lock: Duration::seconds(DEFAULT_STALE_GROUP_LOCK_SECS),
        })
    }

    /// Override the age after which a group lock is broken.
    pub fn with_stale_group_lock(mut self, threshold: Duration) -> Self {
        self.stale_group_lock = threshold;
        self
    }

    pub fn group_dir(&self) -> &Path {
        &self.group_dir
    }

    pub fn group_lock_path(&self) -> PathBuf {
        self.group_dir.join("group.lock")
    }

    fn records_dir(&self) -> PathBuf {
        self.group_dir.join("records")
    }

    fn record_path(&self, key: &RecordKey) -> Result<PathBuf> {
        let valid = !key.as_str().is_empty()
            && key
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(TaskLockError::StoreTransient(format!(
                "invalid record key '{}'",
                key
            )));
        }
        Ok(self.records_dir().join(format!("{}.json", key)))
    }

    /// Read every record file that belongs to `key`.
    ///
    /// Files that cannot be parsed are skipped with a warning.
    fn read_records(&self, key: &LockKey) -> Result<Vec<LockRecord>> {
        let dir = self.records_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| {
            TaskLockError::StoreTransient(format!(
                "failed to read records directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                TaskLockError::StoreTransient(format!(
                    "failed to read records directory entry: {}",
                    e
                ))
            })?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                // Deleted between listing and reading.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(TaskLockError::StoreTransient(format!(
                        "failed to read record '{}': {}",
                        path.display(),
                        e
                    )));
                }
            };

            match serde_json::from_str::<LockRecord>(&content) {
                Ok(record) if record.matches(key) => records.push(record),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable lock record");
                }
            }
        }

        Ok(records)
    }

    fn acquire_group_lock(&self) -> Result<GroupLockGuard> {
        let lock_path = self.group_lock_path();
        let mut holder = None;

        for _ in 0..ACQUIRE_ATTEMPTS {
            let metadata = GroupLockMetadata::new();
            match try_acquire(&lock_path, &metadata)? {
                TryAcquire::Acquired(guard) => return Ok(guard),
                TryAcquire::Held(Some(existing)) if existing.is_stale(self.stale_group_lock) => {
                    warn!(
                        owner = %existing.owner,
                        pid = ?existing.pid,
                        "breaking stale group lock"
                    );
                    if !break_lock(&lock_path, &existing)? {
                        debug!("stale group lock was already replaced");
                    }
                    continue;
                }
                TryAcquire::Held(existing) => holder = existing,
            }
            std::thread::sleep(ACQUIRE_RETRY_DELAY);
        }

        let held_by = match holder {
            Some(meta) => format!(" (held by {}, pid {:?})", meta.owner, meta.pid),
            None => String::new(),
        };
        Err(TaskLockError::StoreTransient(format!(
            "lock group is busy{}",
            held_by
        )))
    }
}

impl DurableStore for FileStore {
    fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        let guard = self.acquire_group_lock()?;
        debug!(group = %self.group_dir.display(), "transaction started");
        Ok(Box::new(FileTransaction {
            store: self,
            guard,
            staged: Vec::new(),
        }))
    }

    fn query(&self, key: &LockKey) -> Result<Vec<LockRecord>> {
        self.read_records(key)
    }

    fn strong_read_after_write(&self) -> bool {
        true
    }
}

enum Staged {
    Put(LockRecord),
    Delete(RecordKey),
}

struct FileTransaction<'a> {
    store: &'a FileStore,
    guard: GroupLockGuard,
    staged: Vec<Staged>,
}

impl StoreTransaction for FileTransaction<'_> {
    fn query(&mut self, key: &LockKey) -> Result<Vec<LockRecord>> {
        self.store.read_records(key)
    }

    fn put(&mut self, record: LockRecord) -> Result<()> {
        self.store.record_path(&record.key)?;
        self.staged.push(Staged::Put(record));
        Ok(())
    }

    fn delete(&mut self, key: &RecordKey) -> Result<()> {
        self.store.record_path(key)?;
        self.staged.push(Staged::Delete(key.clone()));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let FileTransaction {
            store,
            guard,
            staged,
        } = *self;

        if !staged.is_empty() && !guard.is_held() {
            return Err(TaskLockError::NoActiveTransaction);
        }

        for op in staged {
            match op {
                Staged::Put(record) => write_record(&store.record_path(&record.key)?, &record)?,
                Staged::Delete(key) => remove_record(&store.record_path(&key)?)?,
            }
        }

        guard.release()
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        self.guard.release()
    }
}
