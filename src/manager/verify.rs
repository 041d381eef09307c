//! Post-commit verification.

use super::LockManager;
use crate::error::{Result, TaskLockError};
use crate::record::{LockId, LockKey, TaskType};
use crate::resolver::resolve_active;
use tracing::{error, warn};

impl LockManager {
    /// Check, outside any transaction, that `lock_id` is the active holder.
    ///
    /// When a fast cache is configured and names a different current
    /// candidate, verification fails too: the store may not yet show a
    /// competing write the cache has already seen. An empty or unreachable
    /// cache does not fail verification.
    ///
    /// # Errors
    ///
    /// * `Verification` - the caller is not the holder
    /// * `Contention` - the holder cannot be determined
    /// * `StoreTransient` - the query failed
    pub fn verify_lock(&self, lock_id: &LockId, resource_id: &str, task_type: TaskType) -> Result<()> {
        self.verify_key(lock_id, &LockKey::new(resource_id, task_type))
    }

    pub(super) fn verify_key(&self, lock_id: &LockId, key: &LockKey) -> Result<()> {
        let records = self.query(key)?;
        let now = self.clock.now();

        match resolve_active(&records, now, self.config.min_settle())? {
            None => {
                return Err(TaskLockError::Verification(format!(
                    "unable to locate lock {} for {}",
                    lock_id, key
                )));
            }
            Some(active) if active.lock_id != *lock_id => {
                return Err(TaskLockError::Verification(format!(
                    "lock for {} is held by {}, expected {}",
                    key, active.lock_id, lock_id
                )));
            }
            Some(_) => {}
        }

        if let Some(candidate) = self.sync.query_winning_candidate(key)
            && candidate != *lock_id
        {
            error!(%key, %lock_id, %candidate, "cache shows a competing lock the store does not");
            return Err(TaskLockError::Verification(format!(
                "cache names {} as holder of {}, expected {}",
                candidate, key, lock_id
            )));
        }

        Ok(())
    }

    /// Settle if needed, then verify. On failure the caller's records are
    /// cleaned up and the call backs off.
    pub(super) fn confirm(&self, lock_id: &LockId, key: &LockKey) -> bool {
        if self.config.force_settle_wait || !self.store.strong_read_after_write() {
            self.clock.sleep(self.config.min_settle());
        }

        match self.verify_key(lock_id, key) {
            Ok(()) => true,
            Err(e) => {
                warn!(%key, %lock_id, error = %e, "lock verification failed");
                self.cleanup_key(lock_id, key);
                self.back_off();
                false
            }
        }
    }
}
