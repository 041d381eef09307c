//! Lease lock manager.
//!
//! The manager implements obtain / renew / release of exclusive task locks
//! on top of a [`DurableStore`] that is only consistent inside transactions,
//! with an optional [`FastCache`] used to notice a second claimant sooner.
//!
//! # Protocol
//!
//! - **obtain**: in one transaction, resolve the active record for the key.
//!   If there is none, write a new record expiring one task timeout from now
//!   and register it in the cache. Commit, wait for the store to settle if
//!   it lacks read-after-write consistency, then verify outside the
//!   transaction. A failed verification deletes the caller's record and
//!   reports failure even though the commit went through.
//! - **renew**: the same shape, but only the current holder may extend its
//!   record.
//! - **release**: delete the caller's active record. An absent record counts
//!   as released.
//! - **cleanup**: best-effort deletion of the caller's records and of any
//!   record expired for longer than the stale window.
//!
//! Every rollback and failed verification is followed by the `max_settle`
//! backoff, on the assumption that another process is contending.
//!
//! Store failures during obtain and renew turn into `false` so callers can
//! retry the whole call. Release reports them, because a silently failed
//! release leaks the lock until it expires.

mod cleanup;
mod operations;
mod verify;

#[cfg(test)]
mod tests;

use crate::cache::{CacheSynchronizer, FastCache};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::metrics::{AccessMetrics, MetricsSnapshot};
use crate::record::{LockKey, LockRecord, TaskType};
use crate::resolver::resolve_active;
use crate::store::{DurableStore, StoreTransaction};
use std::sync::Arc;

/// Coordinates exclusive task locks across processes.
pub struct LockManager {
    store: Arc<dyn DurableStore>,
    sync: CacheSynchronizer,
    clock: Arc<dyn Clock>,
    config: Config,
    metrics: AccessMetrics,
}

/// Builder for [`LockManager`].
pub struct LockManagerBuilder {
    store: Arc<dyn DurableStore>,
    cache: Option<Arc<dyn FastCache>>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl LockManagerBuilder {
    /// Use a fast cache to corroborate the store.
    pub fn cache(mut self, cache: Arc<dyn FastCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and build the manager.
    pub fn build(self) -> Result<LockManager> {
        self.config.validate()?;

        let sync = CacheSynchronizer::new(
            self.cache,
            self.clock.clone(),
            self.config.cache_prune_window(),
            self.config.cache_retry_limit,
        );

        Ok(LockManager {
            store: self.store,
            sync,
            clock: self.clock,
            config: self.config,
            metrics: AccessMetrics::new(),
        })
    }
}

impl LockManager {
    /// Start building a manager over `store`, with no cache, the system
    /// clock and the default configuration.
    pub fn builder(store: Arc<dyn DurableStore>) -> LockManagerBuilder {
        LockManagerBuilder {
            store,
            cache: None,
            clock: Arc::new(SystemClock),
            config: Config::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_cache(&self) -> bool {
        self.sync.is_enabled()
    }

    /// Store usage so far.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The current holder's record, read outside any transaction.
    ///
    /// # Errors
    ///
    /// `Contention` if two live records are too close to call.
    pub fn active_lock(&self, resource_id: &str, task_type: TaskType) -> Result<Option<LockRecord>> {
        let key = LockKey::new(resource_id, task_type);
        let records = self.query(&key)?;
        let now = self.clock.now();
        Ok(resolve_active(&records, now, self.config.min_settle())?.cloned())
    }

    /// Every stored record for the key, earliest expiry first.
    pub fn list_records(&self, resource_id: &str, task_type: TaskType) -> Result<Vec<LockRecord>> {
        let key = LockKey::new(resource_id, task_type);
        let mut records = self.query(&key)?;
        records.sort_by_key(|r| r.expires_at);
        Ok(records)
    }

    /// Non-transactional query, counted in the metrics.
    fn query(&self, key: &LockKey) -> Result<Vec<LockRecord>> {
        let records = self.store.query(key)?;
        self.metrics.record_query(records.len());
        Ok(records)
    }

    /// Transactional query, counted in the metrics.
    fn query_in(&self, txn: &mut dyn StoreTransaction, key: &LockKey) -> Result<Vec<LockRecord>> {
        let records = txn.query(key)?;
        self.metrics.record_query(records.len());
        Ok(records)
    }

    /// Contention backoff.
    fn back_off(&self) {
        self.clock.sleep(self.config.max_settle());
    }
}
