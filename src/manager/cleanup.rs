//! Best-effort garbage collection of lock records.

use super::LockManager;
use crate::error::Result;
use crate::record::{LockId, LockKey, LockRecord, RecordKey, TaskType};
use tracing::{debug, info, warn};

impl LockManager {
    /// Delete the records of `lock_id` and every record of the key that
    /// expired more than the stale window ago.
    ///
    /// Each record is deleted in its own transaction, so one lost race does
    /// not keep the others alone. Failures are logged and skipped; the
    /// number of deleted records is returned.
    pub fn cleanup(&self, lock_id: &LockId, resource_id: &str, task_type: TaskType) -> usize {
        self.cleanup_key(lock_id, &LockKey::new(resource_id, task_type))
    }

    pub(super) fn cleanup_key(&self, lock_id: &LockId, key: &LockKey) -> usize {
        let doomed = match self.query(key) {
            Ok(records) => self.doomed_records(records, lock_id),
            Err(e) => {
                warn!(%key, %lock_id, error = %e, "cleanup query failed");
                Vec::new()
            }
        };

        let mut deleted = 0;
        for record in &doomed {
            match self.delete_record(&record.key) {
                Ok(()) => {
                    debug!(%key, record = %record.key, owner = %record.lock_id, "deleted lock record");
                    deleted += 1;
                }
                Err(e) => {
                    info!(%key, record = %record.key, error = %e, "rolled back record deletion");
                    self.back_off();
                }
            }
        }

        self.sync.prune_candidate(key, lock_id);

        if deleted > 0 {
            info!(%key, %lock_id, deleted, "cleaned up lock records");
        }
        deleted
    }

    fn doomed_records(&self, records: Vec<LockRecord>, lock_id: &LockId) -> Vec<LockRecord> {
        let now = self.clock.now();
        let window = self.config.stale_record_window();
        records
            .into_iter()
            .filter(|r| r.lock_id == *lock_id || r.is_stale(now, window))
            .collect()
    }

    fn delete_record(&self, record_key: &RecordKey) -> Result<()> {
        let mut txn = self.store.begin_transaction()?;
        self.metrics.record_delete();
        if let Err(e) = txn.delete(record_key) {
            if let Err(rollback_error) = txn.rollback() {
                debug!(error = %rollback_error, "rollback failed");
            }
            return Err(e);
        }
        txn.commit()
    }
}
