//! In-process durable store.

use super::{DurableStore, StoreTransaction};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, TaskLockError};
use crate::record::{LockKey, LockRecord, RecordKey};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Durable store kept in memory.
///
/// By default it behaves like a strongly consistent store with optimistic
/// group transactions: a commit fails if any other transaction committed
/// since this one began.
///
/// [`MemoryStore::eventually_consistent`] models a store whose replicas lag:
/// every read only sees commits older than the configured lag, and commits
/// are not checked for conflicts because the store cannot see the
/// concurrent write in time. That is the environment the settle windows of
/// the lock protocol exist for.
pub struct MemoryStore {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
    visibility_lag: Option<Duration>,
}

#[derive(Default)]
struct State {
    version: u64,
    records: BTreeMap<RecordKey, Vec<Revision>>,
    failing_commits: usize,
}

#[derive(Clone)]
struct Revision {
    committed_at: DateTime<Utc>,
    record: Option<LockRecord>,
}

enum Staged {
    Put(LockRecord),
    Delete(RecordKey),
}

impl MemoryStore {
    /// Strongly consistent store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Strongly consistent store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
            visibility_lag: None,
        }
    }

    /// Store whose reads trail commits by `lag`.
    pub fn eventually_consistent(clock: Arc<dyn Clock>, lag: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
            visibility_lag: Some(lag),
        }
    }

    /// Write a record directly, bypassing transactions.
    ///
    /// The record is visible immediately, even on a lagging store.
    pub fn insert(&self, record: LockRecord) {
        let mut state = self.lock_state();
        state.version += 1;
        state.records.insert(
            record.key.clone(),
            vec![Revision {
                committed_at: DateTime::<Utc>::MIN_UTC,
                record: Some(record),
            }],
        );
    }

    /// Latest committed version of every record, ignoring visibility lag.
    pub fn records(&self) -> Vec<LockRecord> {
        let state = self.lock_state();
        state
            .records
            .values()
            .filter_map(|revisions| revisions.last().and_then(|r| r.record.clone()))
            .collect()
    }

    /// Make the next `count` commits fail with a transient error.
    pub fn fail_next_commits(&self, count: usize) {
        self.lock_state().failing_commits = count;
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn visible(&self, key: &LockKey) -> Vec<LockRecord> {
        let cutoff = self.visibility_lag.map(|lag| self.clock.now() - lag);
        let state = self.lock_state();

        state
            .records
            .values()
            .filter_map(|revisions| {
                let revision = match cutoff {
                    Some(cutoff) => revisions.iter().rev().find(|r| r.committed_at <= cutoff),
                    None => revisions.last(),
                }?;
                revision.record.clone()
            })
            .filter(|record| record.matches(key))
            .collect()
    }

    fn apply(&self, start_version: u64, staged: Vec<Staged>) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.lock_state();

        if state.failing_commits > 0 {
            state.failing_commits -= 1;
            return Err(TaskLockError::StoreTransient(
                "injected commit failure".to_string(),
            ));
        }

        if staged.is_empty() {
            return Ok(());
        }

        if self.visibility_lag.is_none() && state.version != start_version {
            return Err(TaskLockError::StoreTransient(
                "concurrent modification of the lock group".to_string(),
            ));
        }

        for op in staged {
            let (key, record) = match op {
                Staged::Put(record) => (record.key.clone(), Some(record)),
                Staged::Delete(key) => (key, None),
            };
            let revisions = state.records.entry(key).or_default();
            revisions.push(Revision {
                committed_at: now,
                record,
            });
            compact(revisions, now, self.visibility_lag);
        }
        state.records.retain(|_, revisions| !revisions.is_empty());
        state.version += 1;

        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop revisions no reader can observe any more.
fn compact(revisions: &mut Vec<Revision>, now: DateTime<Utc>, lag: Option<Duration>) {
    let cutoff = match lag {
        Some(lag) => now - lag,
        None => now,
    };
    // Index of the newest revision every reader can already see.
    let settled = revisions.iter().rposition(|r| r.committed_at <= cutoff);
    if let Some(settled) = settled {
        revisions.drain(..settled);
        if revisions.len() == 1 && revisions[0].record.is_none() {
            revisions.clear();
        }
    }
}

impl DurableStore for MemoryStore {
    fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction + '_>> {
        let start_version = self.lock_state().version;
        Ok(Box::new(MemoryTransaction {
            store: self,
            start_version,
            staged: Vec::new(),
        }))
    }

    fn query(&self, key: &LockKey) -> Result<Vec<LockRecord>> {
        Ok(self.visible(key))
    }

    fn strong_read_after_write(&self) -> bool {
        self.visibility_lag.is_none()
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    start_version: u64,
    staged: Vec<Staged>,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn query(&mut self, key: &LockKey) -> Result<Vec<LockRecord>> {
        Ok(self.store.visible(key))
    }

    fn put(&mut self, record: LockRecord) -> Result<()> {
        self.staged.push(Staged::Put(record));
        Ok(())
    }

    fn delete(&mut self, key: &RecordKey) -> Result<()> {
        self.staged.push(Staged::Delete(key.clone()));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            store,
            start_version,
            staged,
        } = *self;
        store.apply(start_version, staged)
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
