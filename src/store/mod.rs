//! Durable store adapters.
//!
//! The durable store is the authority on who holds a lock. It only has to
//! offer transactions that are serialized per group (all lock records share
//! one group), plus a non-transactional query that may return stale data.
//!
//! Two adapters are provided:
//! - [`MemoryStore`]: in-process, optionally eventually consistent
//! - [`FileStore`]: one JSON file per record, transactions serialized by an
//!   exclusively created group lock file

mod file;
mod memory;


use crate::error::Result;
use crate::record::{LockKey, LockRecord, RecordKey};

pub use file::{FileStore, GroupLockMetadata};
pub use memory::MemoryStore;

/// Authoritative storage for lock records.
pub trait DurableStore: Send + Sync {
    /// Open a transaction over the lock group.
    ///
    /// Only one of several concurrent transactions against the group may
    /// commit; the others fail with [`TaskLockError::StoreTransient`].
    ///
    /// [`TaskLockError::StoreTransient`]: crate::error::TaskLockError::StoreTransient
    fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction + '_>>;

    /// Every record stored for `key`, in no particular order.
    ///
    /// Runs outside any transaction, so on a weakly consistent store the
    /// result may miss recent commits.
    fn query(&self, key: &LockKey) -> Result<Vec<LockRecord>>;

    /// Whether a committed write is visible to every subsequent query.
    fn strong_read_after_write(&self) -> bool;
}

/// A transaction over the lock group.
///
/// Writes are staged and only become visible on [`commit`](Self::commit).
/// Dropping a transaction without committing rolls it back.
pub trait StoreTransaction {
    /// Every record stored for `key`, read within the transaction.
    fn query(&mut self, key: &LockKey) -> Result<Vec<LockRecord>>;

    /// Insert or replace the record stored under `record.key`.
    fn put(&mut self, record: LockRecord) -> Result<()>;

    /// Delete the record stored under `key`. Deleting a missing record is
    /// not an error.
    fn delete(&mut self, key: &RecordKey) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}
