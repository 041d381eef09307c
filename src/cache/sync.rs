//! Candidate synchronization through the fast cache.
//!
//! For every lock key the cache holds one value: a map from candidate
//! timestamp (milliseconds) to the lock id that claimed it. The lock id with
//! the earliest timestamp that has not yet passed is the cache's view of the
//! winner.
//!
//! All updates are optimistic read-modify-conditional-write cycles with a
//! bounded number of attempts. Before any write, entries older than the
//! prune window and entries of the lock id being updated are removed, which
//! bounds the map's size and keeps stale holders from winning comparisons.

use super::FastCache;
use crate::clock::Clock;
use crate::error::{Result, TaskLockError};
use crate::record::{LockId, LockKey};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Candidate timestamps (epoch milliseconds) to lock ids, ordered.
pub type CandidateMap = BTreeMap<i64, LockId>;

/// Keeps per-key candidate maps in an optional fast cache.
///
/// With no cache configured every operation is a no-op.
pub struct CacheSynchronizer {
    cache: Option<Arc<dyn FastCache>>,
    clock: Arc<dyn Clock>,
    prune_window: Duration,
    retry_limit: u32,
    retry_backoff: Duration,
}

/// A candidate map read from the cache, with the version it was read at.
/// `version` is `None` when the key was absent.
struct Snapshot {
    map: CandidateMap,
    version: Option<u64>,
}

impl CacheSynchronizer {
    pub fn new(
        cache: Option<Arc<dyn FastCache>>,
        clock: Arc<dyn Clock>,
        prune_window: Duration,
        retry_limit: u32,
    ) -> Self {
        Self {
            cache,
            clock,
            prune_window,
            retry_limit,
            retry_backoff: Duration::zero(),
        }
    }

    /// Wait this long between conflicting attempts.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Record `lock_id` as a candidate holder of `key` at `timestamp`.
    ///
    /// # Errors
    ///
    /// * `CacheCollision` - a different lock id already claimed `timestamp`
    /// * `CacheHotEntry` - every conditional write lost a race
    /// * `Cache` - the cache backend failed
    pub fn register_candidate(
        &self,
        key: &LockKey,
        lock_id: &LockId,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let cache_key = key.cache_key();
        let millis = timestamp.timestamp_millis();

        for attempt in 0..self.retry_limit {
            if attempt > 0 {
                self.clock.sleep(self.retry_backoff);
            }

            let snapshot = self.read(cache.as_ref(), &cache_key)?;
            let stored = match snapshot.version {
                None => {
                    let mut map = CandidateMap::new();
                    map.insert(millis, lock_id.clone());
                    cache.put_if_absent(&cache_key, encode(&map)?)?
                }
                Some(version) => {
                    let mut map = snapshot.map;
                    self.prune(&mut map, lock_id);
                    if map.contains_key(&millis) {
                        return Err(TaskLockError::CacheCollision);
                    }
                    map.insert(millis, lock_id.clone());
                    cache.compare_and_swap(&cache_key, version, encode(&map)?)?
                }
            };

            if stored {
                debug!(%key, %lock_id, attempt, "registered cache candidate");
                return Ok(());
            }
        }

        Err(TaskLockError::CacheHotEntry)
    }

    /// The cache's view of the current holder of `key`: the lock id of the
    /// earliest candidate whose timestamp has not passed.
    ///
    /// `None` when there is no cache, no entry, or the cache failed.
    pub fn query_winning_candidate(&self, key: &LockKey) -> Option<LockId> {
        let cache = self.cache.as_ref()?;
        let snapshot = match self.read(cache.as_ref(), &key.cache_key()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(%key, error = %e, "cache read failed");
                return None;
            }
        };

        let now = self.clock.now().timestamp_millis();
        snapshot
            .map
            .into_iter()
            .find(|(timestamp, _)| *timestamp >= now)
            .map(|(_, lock_id)| lock_id)
    }

    /// Remove every trace of `lock_id` (and any expired candidates) from the
    /// entry for `key`. Failures and lost races are ignored; the next writer
    /// prunes the same entries anyway.
    pub fn prune_candidate(&self, key: &LockKey, lock_id: &LockId) {
        let Some(cache) = &self.cache else {
            return;
        };
        let cache_key = key.cache_key();

        for _ in 0..self.retry_limit {
            let snapshot = match self.read(cache.as_ref(), &cache_key) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!(%key, %lock_id, error = %e, "cache prune skipped");
                    return;
                }
            };
            let Some(version) = snapshot.version else {
                return;
            };

            let mut map = snapshot.map;
            self.prune(&mut map, lock_id);

            let swapped = encode(&map)
                .and_then(|value| cache.compare_and_swap(&cache_key, version, value));
            match swapped {
                Ok(true) => return,
                Ok(false) => continue,
                Err(e) => {
                    debug!(%key, %lock_id, error = %e, "cache prune skipped");
                    return;
                }
            }
        }
    }

    /// Drop candidates older than the prune window and those of `lock_id`.
    fn prune(&self, map: &mut CandidateMap, lock_id: &LockId) {
        let oldest_kept = (self.clock.now() - self.prune_window).timestamp_millis();
        map.retain(|timestamp, owner| *timestamp >= oldest_kept && owner != lock_id);
    }

    fn read(&self, cache: &dyn FastCache, cache_key: &str) -> Result<Snapshot> {
        if !cache.contains(cache_key)? {
            return Ok(Snapshot {
                map: CandidateMap::new(),
                version: None,
            });
        }

        let Some(versioned) = cache.get_versioned(cache_key)? else {
            return Ok(Snapshot {
                map: CandidateMap::new(),
                version: None,
            });
        };

        let map = match serde_json::from_str::<CandidateMap>(&versioned.value) {
            Ok(map) => map,
            Err(e) => {
                // Overwritten by the next conditional write.
                warn!(cache_key, error = %e, "discarding undecodable cache entry");
                CandidateMap::new()
            }
        };

        Ok(Snapshot {
            map,
            version: Some(versioned.version),
        })
    }
}

fn encode(map: &CandidateMap) -> Result<String> {
    serde_json::to_string(map)
        .map_err(|e| TaskLockError::Cache(format!("failed to encode candidate map: {}", e)))
}
