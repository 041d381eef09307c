//! Obtain, renew and release.

use super::LockManager;
use crate::error::{Result, TaskLockError};
use crate::record::{LockId, LockKey, LockRecord, TaskType};
use crate::resolver::resolve_active;
use crate::store::StoreTransaction;
use tracing::{debug, info, warn};

/// What a release transaction found.
enum Release {
    Deleted,
    NotHeld,
    HeldBy(LockId),
}

impl LockManager {
    /// Try to take the lock on `resource_id` for `task_type`.
    ///
    /// Returns `true` if the caller holds the lock afterwards, including
    /// when it already held it. Contention, store failures and failed
    /// verification all return `false` after backing off; the caller is
    /// expected to retry with the same `lock_id` or give up.
    pub fn obtain_lock(&self, lock_id: &LockId, resource_id: &str, task_type: TaskType) -> bool {
        let key = LockKey::new(resource_id, task_type);
        debug!(%key, %lock_id, "obtaining lock");

        let claimed = self.in_transaction(|txn| self.claim(txn, lock_id, &key));
        match claimed {
            Ok(true) => {}
            Ok(false) => {
                info!(%key, %lock_id, "lock is held by another process");
                self.back_off();
                return false;
            }
            Err(e) => {
                info!(%key, %lock_id, error = %e, "rolled back obtain");
                self.back_off();
                return false;
            }
        }

        let confirmed = self.confirm(lock_id, &key);
        if confirmed {
            info!(%key, %lock_id, "lock obtained");
        }
        confirmed
    }

    /// Extend the caller's lease by one task timeout from now.
    ///
    /// Returns `false` (after backing off) if the caller is not the current
    /// holder or the renewal could not be confirmed. A holder whose record
    /// already expired cannot renew; it has to obtain the lock again.
    pub fn renew_lock(&self, lock_id: &LockId, resource_id: &str, task_type: TaskType) -> bool {
        let key = LockKey::new(resource_id, task_type);
        debug!(%key, %lock_id, "renewing lock");

        let renewed = self.in_transaction(|txn| self.extend(txn, lock_id, &key));
        match renewed {
            Ok(true) => {}
            Ok(false) => {
                info!(%key, %lock_id, "cannot renew a lock held by another process");
                self.back_off();
                return false;
            }
            Err(e) => {
                info!(%key, %lock_id, error = %e, "rolled back renew");
                self.back_off();
                return false;
            }
        }

        let confirmed = self.confirm(lock_id, &key);
        if confirmed {
            info!(%key, %lock_id, "lock renewed");
        }
        confirmed
    }

    /// Give up the caller's lock.
    ///
    /// Returns `Ok(true)` when the caller no longer holds the lock, whether
    /// this call deleted the record or it was already gone. Releasing twice
    /// is harmless.
    ///
    /// # Errors
    ///
    /// * `LockOverwritten` - another lock id holds the lock; the caller's
    ///   own records are cleaned up before returning
    /// * `Contention` - the holder cannot be determined; the caller's own
    ///   records are cleaned up before returning
    /// * `StoreTransient` / `NoActiveTransaction` - the store failed and the
    ///   lock may still be held
    pub fn release_lock(
        &self,
        lock_id: &LockId,
        resource_id: &str,
        task_type: TaskType,
    ) -> Result<bool> {
        let key = LockKey::new(resource_id, task_type);
        debug!(%key, %lock_id, "releasing lock");

        let outcome = self.release_in_transaction(lock_id, &key);
        self.sync.prune_candidate(&key, lock_id);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(TaskLockError::Contention) => {
                // The caller's record is part of the tie.
                warn!(%key, %lock_id, "near tie during release, cleaning up");
                self.cleanup_key(lock_id, &key);
                return Err(TaskLockError::Contention);
            }
            Err(e) => return Err(e),
        };

        match outcome {
            Release::Deleted => {
                info!(%key, %lock_id, "lock released");
                Ok(true)
            }
            Release::NotHeld => {
                debug!(%key, %lock_id, "no lock to release");
                Ok(true)
            }
            Release::HeldBy(actual) => {
                warn!(%key, %lock_id, holder = %actual, "lock was overwritten before release");
                self.cleanup_key(lock_id, &key);
                Err(TaskLockError::LockOverwritten {
                    expected: lock_id.to_string(),
                    actual: actual.to_string(),
                })
            }
        }
    }

    /// Run `body` in a transaction that commits on `Ok(true)` and rolls back
    /// otherwise.
    fn in_transaction<F>(&self, body: F) -> Result<bool>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<bool>,
    {
        let mut txn = self.store.begin_transaction()?;
        match body(txn.as_mut()) {
            Ok(true) => {
                txn.commit()?;
                Ok(true)
            }
            Ok(false) => {
                txn.rollback()?;
                Ok(false)
            }
            Err(e) => {
                if let Err(rollback_error) = txn.rollback() {
                    debug!(error = %rollback_error, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Write a new record if nobody holds the lock. `Ok(true)` if the caller
    /// holds it once the transaction commits.
    fn claim(&self, txn: &mut dyn StoreTransaction, lock_id: &LockId, key: &LockKey) -> Result<bool> {
        let records = self.query_in(txn, key)?;
        let now = self.clock.now();

        match resolve_active(&records, now, self.config.min_settle())? {
            None => {
                let record = LockRecord::new(lock_id.clone(), key, now);
                self.write(txn, record)?;
                Ok(true)
            }
            Some(active) => Ok(active.lock_id == *lock_id),
        }
    }

    /// Push the caller's active record out to a fresh expiry.
    fn extend(&self, txn: &mut dyn StoreTransaction, lock_id: &LockId, key: &LockKey) -> Result<bool> {
        let records = self.query_in(txn, key)?;
        let now = self.clock.now();

        match resolve_active(&records, now, self.config.min_settle())? {
            Some(active) if active.lock_id == *lock_id => {
                let mut record = active.clone();
                record.refresh(now);
                self.write(txn, record)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Register `record` in the cache, then stage it in the transaction.
    ///
    /// A cache collision or an entry too hot to update aborts the write.
    /// Any other cache failure only costs the cache's early warning.
    fn write(&self, txn: &mut dyn StoreTransaction, record: LockRecord) -> Result<()> {
        let key = record.lock_key();
        match self.sync.register_candidate(&key, &record.lock_id, record.expires_at) {
            Ok(()) => {}
            Err(e @ (TaskLockError::CacheCollision | TaskLockError::CacheHotEntry)) => {
                return Err(e);
            }
            Err(e) => {
                warn!(%key, lock_id = %record.lock_id, error = %e, "cache unavailable, continuing without it");
            }
        }

        self.metrics.record_put();
        txn.put(record)
    }

    fn release_in_transaction(&self, lock_id: &LockId, key: &LockKey) -> Result<Release> {
        let mut txn = self.store.begin_transaction()?;

        let decided = self.decide_release(txn.as_mut(), lock_id, key);

        match decided {
            Ok(Release::HeldBy(actual)) => {
                txn.rollback()?;
                Ok(Release::HeldBy(actual))
            }
            Ok(release) => {
                txn.commit()?;
                Ok(release)
            }
            Err(e) => {
                if let Err(rollback_error) = txn.rollback() {
                    debug!(error = %rollback_error, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn decide_release(
        &self,
        txn: &mut dyn StoreTransaction,
        lock_id: &LockId,
        key: &LockKey,
    ) -> Result<Release> {
        let records = self.query_in(txn, key)?;
        let now = self.clock.now();

        match resolve_active(&records, now, self.config.min_settle())? {
            None => Ok(Release::NotHeld),
            Some(active) if active.lock_id == *lock_id => {
                self.metrics.record_delete();
                txn.delete(&active.key)?;
                Ok(Release::Deleted)
            }
            Some(active) => Ok(Release::HeldBy(active.lock_id.clone())),
        }
    }
}
