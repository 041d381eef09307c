//! Store access accounting.
//!
//! Counts record reads, puts and deletes issued by the lock manager so that
//! operators can see what the protocol costs against a metered store.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters of durable store usage.
#[derive(Debug, Default)]
pub struct AccessMetrics {
    queries: AtomicU64,
    records_read: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
}

/// Point-in-time copy of [`AccessMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queries: u64,
    pub records_read: u64,
    pub puts: u64,
    pub deletes: u64,
}

impl AccessMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// One query that scanned `records` records.
    pub fn record_query(&self, records: usize) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.records_read.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            records_read: self.records_read.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate() {
        let metrics = AccessMetrics::new();
        metrics.record_query(3);
        metrics.record_query(0);
        metrics.record_put();
        metrics.record_delete();
        metrics.record_delete();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                queries: 2,
                records_read: 3,
                puts: 1,
                deletes: 2,
            }
        );
    }

    #[test]
    fn snapshot_serializes() {
        let json = serde_json::to_string(&AccessMetrics::new().snapshot()).unwrap();
        assert!(json.contains("\"records_read\":0"));
    }
}
