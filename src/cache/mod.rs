//! Fast cache adapters and the candidate synchronizer.
//!
//! The fast cache is advisory. It lets a second claimant notice contention
//! sooner than the durable store's consistency window would allow, but its
//! contents may be stale or missing without affecting correctness. A lock
//! manager built without a cache behaves identically except that
//! verification skips the cache cross-check.

mod memory;
mod sync;


use crate::error::Result;

pub use memory::MemoryCache;
pub use sync::{CacheSynchronizer, CandidateMap};

/// A cached value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: String,
    pub version: u64,
}

/// Low-latency, weakly consistent key/value store with conditional writes.
pub trait FastCache: Send + Sync {
    fn contains(&self, key: &str) -> Result<bool>;

    /// Current value and its version, if present.
    fn get_versioned(&self, key: &str) -> Result<Option<Versioned>>;

    /// Store `value` only if `key` is absent. Returns whether it was stored.
    fn put_if_absent(&self, key: &str, value: String) -> Result<bool>;

    /// Replace the value only if it is still at `expected_version`.
    /// Returns whether it was replaced.
    fn compare_and_swap(&self, key: &str, expected_version: u64, value: String) -> Result<bool>;
}
