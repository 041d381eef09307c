//! Contention resolution.
//!
//! Given every record stored for one lock key, decide which one (if any) is
//! the active holder. The store returns records in no particular order and
//! may still hold expired or competing records from earlier races.

use crate::error::{Result, TaskLockError};
use crate::record::LockRecord;
use chrono::{DateTime, Duration, Utc};

/// Find the active record among `records`.
///
/// Expired records are ignored. Among the live ones the earliest
/// `expires_at` wins, unless any two live records are closer together than
/// `min_settle`: the store cannot order such writes reliably, so the result
/// is [`TaskLockError::Contention`] rather than a guess.
pub fn resolve_active(
    records: &[LockRecord],
    now: DateTime<Utc>,
    min_settle: Duration,
) -> Result<Option<&LockRecord>> {
    let mut live: Vec<&LockRecord> = records.iter().filter(|r| !r.is_expired(now)).collect();
    live.sort_by_key(|r| r.expires_at);

    for pair in live.windows(2) {
        if pair[1].expires_at - pair[0].expires_at < min_settle {
            return Err(TaskLockError::Contention);
        }
    }

    Ok(live.first().copied())
}
