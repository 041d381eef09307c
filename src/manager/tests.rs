//! Lock manager scenarios against the in-memory store and cache.

use super::*;
use crate::cache::{CandidateMap, MemoryCache};
use crate::clock::ManualClock;
use crate::error::TaskLockError;
use crate::record::LockId;
use crate::store::MemoryStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Barrier;

const RESOURCE: &str = "form-1";
const TASK: TaskType = TaskType::FormDeletion;

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    cache: Arc<MemoryCache>,
    manager: LockManager,
}

fn harness() -> Harness {
    build_harness(false)
}

fn harness_with_cache() -> Harness {
    build_harness(true)
}

fn build_harness(with_cache: bool) -> Harness {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let cache = Arc::new(MemoryCache::new());

    let mut builder = LockManager::builder(store.clone()).clock(clock.clone());
    if with_cache {
        builder = builder.cache(cache.clone());
    }

    Harness {
        clock,
        store,
        cache,
        manager: builder.build().unwrap(),
    }
}

fn id(value: &str) -> LockId {
    LockId::from(value)
}

fn key() -> LockKey {
    LockKey::new(RESOURCE, TASK)
}

/// A record for `lock_id` expiring at `expires_at`.
fn record(lock_id: &str, expires_at: DateTime<Utc>) -> LockRecord {
    let mut record = LockRecord::new(id(lock_id), &key(), expires_at);
    record.expires_at = expires_at;
    record
}

fn owners(store: &MemoryStore) -> Vec<String> {
    let mut owners: Vec<String> = store
        .records()
        .into_iter()
        .map(|r| r.lock_id.to_string())
        .collect();
    owners.sort();
    owners
}

// =============================================================================
// obtain
// =============================================================================

#[test]
fn test_obtain_on_free_resource() {
    let h = harness();
    let start = h.clock.now();

    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].lock_id.as_str(), "a");
    assert_eq!(records[0].expires_at, start + TASK.lock_timeout());
    // Strong store: no settle wait.
    assert_eq!(h.clock.now(), start);
    h.manager.verify_lock(&id("a"), RESOURCE, TASK).unwrap();
}

#[test]
fn test_obtain_is_idempotent_for_holder() {
    let h = harness();

    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    assert_eq!(h.store.records().len(), 1);
    assert_eq!(h.manager.metrics().puts, 1);
}

#[test]
fn test_obtain_fails_while_held_and_backs_off() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    let before = h.clock.now();

    assert!(!h.manager.obtain_lock(&id("b"), RESOURCE, TASK));

    assert_eq!(h.clock.now() - before, h.manager.config().max_settle());
    assert_eq!(owners(&h.store), vec!["a"]);
}

#[test]
fn test_different_task_types_do_not_conflict() {
    let h = harness();

    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TaskType::FormDeletion));
    assert!(h.manager.obtain_lock(&id("b"), RESOURCE, TaskType::TableMigration));
    assert!(h.manager.obtain_lock(&id("c"), "form-2", TaskType::FormDeletion));
}

#[test]
fn test_obtain_after_expiry() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    h.clock.advance(TASK.lock_timeout() + Duration::milliseconds(1));

    assert!(h.manager.obtain_lock(&id("b"), RESOURCE, TASK));
    let active = h.manager.active_lock(RESOURCE, TASK).unwrap().unwrap();
    assert_eq!(active.lock_id.as_str(), "b");
}

#[test]
fn test_obtain_fails_on_commit_failure() {
    let h = harness();
    h.store.fail_next_commits(1);
    let before = h.clock.now();

    assert!(!h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    assert!(h.store.records().is_empty());
    assert_eq!(h.clock.now() - before, h.manager.config().max_settle());

    // The next attempt goes through.
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
}

#[test]
fn test_obtain_fails_on_near_tie() {
    let h = harness();
    let now = h.clock.now();
    h.store.insert(record("x", now + Duration::seconds(30)));
    h.store.insert(record("y", now + Duration::milliseconds(30_400)));

    assert!(!h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    assert!(matches!(
        h.manager.active_lock(RESOURCE, TASK),
        Err(TaskLockError::Contention)
    ));
    assert_eq!(owners(&h.store), vec!["x", "y"]);
}

#[test]
fn test_near_tie_resolves_after_loser_cleans_up() {
    let h = harness();
    let now = h.clock.now();
    h.store.insert(record("a", now + Duration::seconds(30)));
    h.store.insert(record("b", now + Duration::milliseconds(30_300)));

    assert!(!h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    assert_eq!(h.manager.cleanup(&id("a"), RESOURCE, TASK), 1);

    assert!(h.manager.obtain_lock(&id("b"), RESOURCE, TASK));
    assert!(!h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    assert_eq!(owners(&h.store), vec!["b"]);
}

#[test]
fn test_obtain_waits_to_settle_on_lagging_store() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(MemoryStore::eventually_consistent(
        clock.clone(),
        Duration::milliseconds(200),
    ));
    let manager = LockManager::builder(store.clone())
        .clock(clock.clone())
        .build()
        .unwrap();
    let start = clock.now();

    assert!(manager.obtain_lock(&id("a"), RESOURCE, TASK));
    assert_eq!(clock.now() - start, manager.config().min_settle());
}

#[test]
fn test_forced_settle_wait() {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let config = Config {
        force_settle_wait: true,
        ..Config::default()
    };
    let manager = LockManager::builder(store)
        .clock(clock.clone())
        .config(config)
        .build()
        .unwrap();
    let start = clock.now();

    assert!(manager.obtain_lock(&id("a"), RESOURCE, TASK));
    assert_eq!(clock.now() - start, manager.config().min_settle());
}

#[test]
fn test_build_rejects_invalid_config() {
    let config = Config {
        min_settle_ms: 5000,
        max_settle_ms: 1000,
        ..Config::default()
    };
    let result = LockManager::builder(Arc::new(MemoryStore::new()))
        .config(config)
        .build();

    assert!(matches!(result, Err(TaskLockError::UserError(_))));
}

// =============================================================================
// renew
// =============================================================================

#[test]
fn test_renew_keeps_lock_across_timeouts() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    for _ in 0..3 {
        h.clock.advance(Duration::seconds(45));
        assert!(h.manager.renew_lock(&id("a"), RESOURCE, TASK));
        assert!(!h.manager.obtain_lock(&id("b"), RESOURCE, TASK));
    }

    let record = &h.store.records()[0];
    // The last renewal happened before b's backoff.
    let renewed_at = h.clock.now() - h.manager.config().max_settle();
    assert_eq!(record.expires_at, renewed_at + TASK.lock_timeout());

    h.clock.advance(TASK.lock_timeout());
    assert!(h.manager.obtain_lock(&id("b"), RESOURCE, TASK));
}

#[test]
fn test_renew_updates_record_in_place() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    let original = h.store.records()[0].clone();

    h.clock.advance(Duration::seconds(10));
    assert!(h.manager.renew_lock(&id("a"), RESOURCE, TASK));

    let records = h.store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, original.key);
    assert_eq!(records[0].expires_at, original.expires_at + Duration::seconds(10));
}

#[test]
fn test_renew_by_non_holder_fails() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    let original = h.store.records();

    assert!(!h.manager.renew_lock(&id("b"), RESOURCE, TASK));

    assert_eq!(h.store.records(), original);
}

#[test]
fn test_renew_without_lock_fails() {
    let h = harness();
    assert!(!h.manager.renew_lock(&id("a"), RESOURCE, TASK));
    assert!(h.store.records().is_empty());
}

#[test]
fn test_renew_after_expiry_fails() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    h.clock.advance(TASK.lock_timeout() + Duration::seconds(1));

    assert!(!h.manager.renew_lock(&id("a"), RESOURCE, TASK));
}

// =============================================================================
// release
// =============================================================================

#[test]
fn test_release_is_idempotent() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    assert!(h.manager.release_lock(&id("a"), RESOURCE, TASK).unwrap());
    assert!(h.store.records().is_empty());
    let after_first = h.manager.metrics();

    assert!(h.manager.release_lock(&id("a"), RESOURCE, TASK).unwrap());
    let after_second = h.manager.metrics();
    assert_eq!(after_second.deletes, after_first.deletes);
    assert_eq!(after_second.puts, after_first.puts);
    assert_eq!(after_first.deletes, 1);
}

#[test]
fn test_release_then_other_obtains() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    assert!(h.manager.release_lock(&id("a"), RESOURCE, TASK).unwrap());

    assert!(h.manager.obtain_lock(&id("b"), RESOURCE, TASK));
}

#[test]
fn test_release_of_overwritten_lock() {
    let h = harness();
    h.store.insert(record("b", h.clock.now() + Duration::seconds(30)));

    let result = h.manager.release_lock(&id("a"), RESOURCE, TASK);

    match result {
        Err(TaskLockError::LockOverwritten { expected, actual }) => {
            assert_eq!(expected, "a");
            assert_eq!(actual, "b");
        }
        other => panic!("expected LockOverwritten, got {:?}", other),
    }
    assert_eq!(owners(&h.store), vec!["b"]);
}

#[test]
fn test_release_surfaces_store_failure() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    h.store.fail_next_commits(1);

    let result = h.manager.release_lock(&id("a"), RESOURCE, TASK);
    assert!(matches!(result, Err(TaskLockError::StoreTransient(_))));
    assert_eq!(owners(&h.store), vec!["a"]);

    assert!(h.manager.release_lock(&id("a"), RESOURCE, TASK).unwrap());
    assert!(h.store.records().is_empty());
}

#[test]
fn test_release_reports_contention() {
    let h = harness();
    let now = h.clock.now();
    h.store.insert(record("a", now + Duration::seconds(30)));
    h.store.insert(record("b", now + Duration::milliseconds(30_100)));

    assert!(matches!(
        h.manager.release_lock(&id("a"), RESOURCE, TASK),
        Err(TaskLockError::Contention)
    ));

    // The releasing side withdrew its record, so the tie is gone.
    assert_eq!(owners(&h.store), vec!["b"]);
    assert!(h.manager.obtain_lock(&id("b"), RESOURCE, TASK));
}

// =============================================================================
// verify
// =============================================================================

#[test]
fn test_verify_without_record() {
    let h = harness();
    let result = h.manager.verify_lock(&id("a"), RESOURCE, TASK);
    assert!(matches!(result, Err(TaskLockError::Verification(_))));
}

#[test]
fn test_verify_other_holder() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    let err = h.manager.verify_lock(&id("b"), RESOURCE, TASK).unwrap_err();
    assert!(matches!(err, TaskLockError::Verification(_)));
    assert!(err.to_string().contains("held by a"));
}

// =============================================================================
// cleanup
// =============================================================================

#[test]
fn test_cleanup_deletes_stale_and_own_records() {
    let h = harness();
    let now = h.clock.now();
    h.store.insert(record("stale", now - Duration::hours(25)));
    h.store.insert(record("recent", now - Duration::hours(1)));
    h.store.insert(record("a", now + Duration::seconds(30)));

    let deleted = h.manager.cleanup(&id("a"), RESOURCE, TASK);

    assert_eq!(deleted, 2);
    assert_eq!(owners(&h.store), vec!["recent"]);
}

#[test]
fn test_cleanup_leaves_other_keys_alone() {
    let h = harness();
    let old = h.clock.now() - Duration::hours(48);
    let other = LockKey::new("form-2", TASK);
    let mut foreign = LockRecord::new(id("z"), &other, old);
    foreign.expires_at = old;
    h.store.insert(foreign);

    assert_eq!(h.manager.cleanup(&id("a"), RESOURCE, TASK), 0);
    assert_eq!(h.store.records().len(), 1);
}

#[test]
fn test_cleanup_tolerates_store_failure() {
    let h = harness();
    h.store.insert(record("a", h.clock.now() + Duration::seconds(30)));
    h.store.fail_next_commits(1);
    let before = h.clock.now();

    assert_eq!(h.manager.cleanup(&id("a"), RESOURCE, TASK), 0);
    assert_eq!(h.clock.now() - before, h.manager.config().max_settle());
    assert_eq!(owners(&h.store), vec!["a"]);
}

// =============================================================================
// fast cache
// =============================================================================

#[test]
fn test_obtain_registers_cache_candidate() {
    let h = harness_with_cache();
    assert!(h.manager.has_cache());

    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    let map: CandidateMap = serde_json::from_str(&h.cache.raw(&key().cache_key()).unwrap()).unwrap();
    let expires_at = h.store.records()[0].expires_at;
    assert_eq!(map[&expires_at.timestamp_millis()].as_str(), "a");
}

#[test]
fn test_release_prunes_cache_candidate() {
    let h = harness_with_cache();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    assert!(h.manager.release_lock(&id("a"), RESOURCE, TASK).unwrap());

    let map: CandidateMap = serde_json::from_str(&h.cache.raw(&key().cache_key()).unwrap()).unwrap();
    assert!(map.is_empty());
}

#[test]
fn test_cache_candidate_unseen_by_store_fails_obtain() {
    let h = harness_with_cache();
    // Another process registered an earlier claim that the store does not
    // show yet.
    let mut phantom = CandidateMap::new();
    phantom.insert(
        (h.clock.now() + Duration::seconds(5)).timestamp_millis(),
        id("ghost"),
    );
    h.cache.put(&key().cache_key(), serde_json::to_string(&phantom).unwrap());

    assert!(!h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    // The failed attempt removed its own record.
    assert!(h.store.records().is_empty());
}

#[test]
fn test_cache_mismatch_fails_verify() {
    let h = harness_with_cache();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    let mut map: CandidateMap =
        serde_json::from_str(&h.cache.raw(&key().cache_key()).unwrap()).unwrap();
    map.insert(h.clock.now().timestamp_millis() + 1, id("ghost"));
    h.cache.put(&key().cache_key(), serde_json::to_string(&map).unwrap());

    let err = h.manager.verify_lock(&id("a"), RESOURCE, TASK).unwrap_err();
    assert!(matches!(err, TaskLockError::Verification(_)));
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn test_empty_cache_does_not_fail_verify() {
    let h = harness_with_cache();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    h.cache.clear();

    h.manager.verify_lock(&id("a"), RESOURCE, TASK).unwrap();
}

#[test]
fn test_cache_collision_aborts_obtain() {
    let h = harness_with_cache();
    // Same expiry timestamp "a" is about to claim.
    let mut taken = CandidateMap::new();
    taken.insert(
        (h.clock.now() + TASK.lock_timeout()).timestamp_millis(),
        id("other"),
    );
    h.cache.put(&key().cache_key(), serde_json::to_string(&taken).unwrap());

    assert!(!h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    assert!(h.store.records().is_empty());
    assert_eq!(h.manager.metrics().puts, 0);
}

#[test]
fn test_cache_outage_is_tolerated() {
    let h = harness_with_cache();
    h.cache.set_unavailable(true);

    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
    assert!(h.manager.renew_lock(&id("a"), RESOURCE, TASK));
    assert!(h.manager.release_lock(&id("a"), RESOURCE, TASK).unwrap());
}

#[test]
fn test_same_outcomes_without_cache() {
    for h in [harness(), harness_with_cache()] {
        assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));
        assert!(!h.manager.obtain_lock(&id("b"), RESOURCE, TASK));
        assert!(h.manager.renew_lock(&id("a"), RESOURCE, TASK));
        assert!(h.manager.release_lock(&id("a"), RESOURCE, TASK).unwrap());
        assert!(h.manager.obtain_lock(&id("b"), RESOURCE, TASK));
    }
}

// =============================================================================
// bookkeeping
// =============================================================================

#[test]
fn test_list_records_sorted_by_expiry() {
    let h = harness();
    let now = h.clock.now();
    h.store.insert(record("late", now + Duration::seconds(50)));
    h.store.insert(record("early", now - Duration::seconds(50)));

    let listed: Vec<String> = h
        .manager
        .list_records(RESOURCE, TASK)
        .unwrap()
        .into_iter()
        .map(|r| r.lock_id.to_string())
        .collect();
    assert_eq!(listed, vec!["early", "late"]);
}

#[test]
fn test_metrics_count_store_access() {
    let h = harness();
    assert!(h.manager.obtain_lock(&id("a"), RESOURCE, TASK));

    let metrics = h.manager.metrics();
    // Transactional read plus the verification read.
    assert_eq!(metrics.queries, 2);
    assert_eq!(metrics.records_read, 1);
    assert_eq!(metrics.puts, 1);
    assert_eq!(metrics.deletes, 0);
}

// =============================================================================
// concurrency
// =============================================================================

#[test]
fn test_simultaneous_obtain_on_lagging_store() {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::eventually_consistent(
        clock.clone(),
        Duration::milliseconds(50),
    ));
    let config = Config {
        min_settle_ms: 500,
        max_settle_ms: 500,
        ..Config::default()
    };
    let manager = LockManager::builder(store.clone())
        .clock(clock)
        .config(config)
        .build()
        .unwrap();
    let barrier = Barrier::new(2);

    let results: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|lock_id| {
                let manager = &manager;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    manager.obtain_lock(&id(lock_id), RESOURCE, TASK)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Neither write was visible to the other's transaction, and the two
    // expiries are too close to order.
    assert_eq!(results, vec![false, false]);
    assert!(store.records().is_empty());

    // Retried one after the other, exactly one wins.
    let a = manager.obtain_lock(&id("a"), RESOURCE, TASK);
    let b = manager.obtain_lock(&id("b"), RESOURCE, TASK);
    assert!(a ^ b);
    assert_eq!(store.records().len(), 1);
}
