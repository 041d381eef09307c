//! Tests for the file-backed store.

use super::*;
use crate::record::{LockId, TaskType};
use chrono::Utc;
use tempfile::TempDir;

fn key() -> LockKey {
    LockKey::new("form-1", TaskType::UploadSubmissions)
}

fn new_record(lock_id: &str) -> LockRecord {
    LockRecord::new(LockId::from(lock_id), &key(), Utc::now())
}

fn create_test_store() -> (TempDir, FileStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(temp_dir.path()).unwrap();
    (temp_dir, store)
}

#[test]
fn test_open_creates_layout() {
    let (temp_dir, store) = create_test_store();

    assert!(temp_dir.path().join("TASK_LOCKS").join("records").is_dir());
    assert_eq!(store.group_dir(), temp_dir.path().join("TASK_LOCKS"));
    assert!(store.strong_read_after_write());
}

#[test]
fn test_commit_writes_record_file() {
    let (_temp_dir, store) = create_test_store();
    let record = new_record("a");

    let mut txn = store.begin_transaction().unwrap();
    txn.put(record.clone()).unwrap();
    txn.commit().unwrap();

    let records = store.query(&key()).unwrap();
    assert_eq!(records, vec![record]);
    assert!(!store.group_lock_path().exists());
}

#[test]
fn test_rollback_writes_nothing_and_releases_lock() {
    let (_temp_dir, store) = create_test_store();

    let mut txn = store.begin_transaction().unwrap();
    assert!(store.group_lock_path().exists());
    txn.put(new_record("a")).unwrap();
    txn.rollback().unwrap();

    assert!(store.query(&key()).unwrap().is_empty());
    assert!(!store.group_lock_path().exists());
}

#[test]
fn test_dropped_transaction_releases_lock() {
    let (_temp_dir, store) = create_test_store();

    {
        let _txn = store.begin_transaction().unwrap();
        assert!(store.group_lock_path().exists());
    }

    assert!(!store.group_lock_path().exists());
}

#[test]
fn test_delete_removes_record_file() {
    let (_temp_dir, store) = create_test_store();
    let record = new_record("a");

    let mut txn = store.begin_transaction().unwrap();
    txn.put(record.clone()).unwrap();
    txn.commit().unwrap();

    let mut txn = store.begin_transaction().unwrap();
    txn.delete(&record.key).unwrap();
    txn.delete(&RecordKey::from("missing")).unwrap();
    txn.commit().unwrap();

    assert!(store.query(&key()).unwrap().is_empty());
}

#[test]
fn test_busy_group_fails_with_holder_details() {
    let (_temp_dir, store) = create_test_store();

    let _held = store.begin_transaction().unwrap();
    let result = store.begin_transaction();

    let err = result.err().unwrap();
    assert!(matches!(err, TaskLockError::StoreTransient(_)));
    assert!(err.to_string().contains("busy"));
}

#[test]
fn test_stale_group_lock_is_broken() {
    let (_temp_dir, store) = create_test_store();

    let stale = GroupLockMetadata {
        owner: "crashed@host".to_string(),
        pid: Some(1),
        created_at: Utc::now() - Duration::minutes(5),
    };
    std::fs::write(store.group_lock_path(), stale.to_json().unwrap()).unwrap();

    let mut txn = store.begin_transaction().unwrap();
    txn.put(new_record("a")).unwrap();
    txn.commit().unwrap();

    assert_eq!(store.query(&key()).unwrap().len(), 1);
}

#[test]
fn test_commit_after_lock_was_broken_fails() {
    let (_temp_dir, store) = create_test_store();

    let mut txn = store.begin_transaction().unwrap();
    txn.put(new_record("a")).unwrap();

    // Another process broke the lock and took it.
    let usurper = GroupLockMetadata {
        owner: "other@host".to_string(),
        pid: Some(2),
        created_at: Utc::now(),
    };
    std::fs::write(store.group_lock_path(), usurper.to_json().unwrap()).unwrap();

    let result = txn.commit();
    assert!(matches!(result, Err(TaskLockError::NoActiveTransaction)));
    assert!(store.query(&key()).unwrap().is_empty());
    // The usurper's lock must survive.
    assert!(store.group_lock_path().exists());
}

#[test]
fn test_invalid_record_key_rejected() {
    let (_temp_dir, store) = create_test_store();

    let mut txn = store.begin_transaction().unwrap();
    let result = txn.delete(&RecordKey::from("../escape"));
    assert!(result.is_err());
}

#[test]
fn test_unreadable_record_files_are_skipped() {
    let (_temp_dir, store) = create_test_store();
    std::fs::write(store.group_dir().join("records").join("junk.json"), "not json").unwrap();
    std::fs::write(store.group_dir().join("records").join(".x.json.tmp"), "{}").unwrap();

    let mut txn = store.begin_transaction().unwrap();
    txn.put(new_record("a")).unwrap();
    txn.commit().unwrap();

    assert_eq!(store.query(&key()).unwrap().len(), 1);
}

#[test]
fn test_reopen_sees_existing_records() {
    let (temp_dir, store) = create_test_store();

    let mut txn = store.begin_transaction().unwrap();
    txn.put(new_record("a")).unwrap();
    txn.commit().unwrap();

    let reopened = FileStore::open(temp_dir.path()).unwrap();
    assert_eq!(reopened.query(&key()).unwrap().len(), 1);
}

#[test]
fn test_half_written_temp_file_is_never_read() {
    let (_temp_dir, store) = create_test_store();
    let record = new_record("a");
    let records_dir = store.group_dir().join("records");

    // A crash mid-write leaves a truncated temp file beside the record.
    let json = record.to_json().unwrap();
    std::fs::write(
        records_dir.join(format!("{}.tmp", record.key)),
        &json[..json.len() / 2],
    )
    .unwrap();
    assert!(store.query(&key()).unwrap().is_empty());

    let mut txn = store.begin_transaction().unwrap();
    txn.put(record.clone()).unwrap();
    txn.commit().unwrap();

    assert_eq!(store.query(&key()).unwrap(), vec![record.clone()]);
    assert!(!records_dir.join(format!("{}.tmp", record.key)).exists());
}

#[test]
fn test_put_replaces_record_file_in_place() {
    let (_temp_dir, store) = create_test_store();
    let mut record = new_record("a");

    let mut txn = store.begin_transaction().unwrap();
    txn.put(record.clone()).unwrap();
    txn.commit().unwrap();

    record.refresh(record.expires_at);
    let mut txn = store.begin_transaction().unwrap();
    txn.put(record.clone()).unwrap();
    txn.commit().unwrap();

    let files: Vec<_> = std::fs::read_dir(store.group_dir().join("records"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(files.len(), 1);
    assert_eq!(store.query(&key()).unwrap(), vec![record]);
}

#[test]
fn test_commit_into_missing_records_dir_fails() {
    let (_temp_dir, store) = create_test_store();
    std::fs::remove_dir_all(store.group_dir().join("records")).unwrap();

    let mut txn = store.begin_transaction().unwrap();
    txn.put(new_record("a")).unwrap();

    let result = txn.commit();
    assert!(matches!(result, Err(TaskLockError::StoreTransient(_))));
}

#[test]
fn test_break_lock_keeps_replaced_lock() {
    let (_temp_dir, store) = create_test_store();
    let lock_path = store.group_lock_path();

    let stale = GroupLockMetadata {
        owner: "crashed@host".to_string(),
        pid: Some(1),
        created_at: Utc::now() - Duration::minutes(5),
    };
    // Another process broke the stale lock and took the group first.
    let fresh = GroupLockMetadata {
        owner: "other@host".to_string(),
        pid: Some(2),
        created_at: Utc::now(),
    };
    std::fs::write(&lock_path, fresh.to_json().unwrap()).unwrap();

    assert!(!break_lock(&lock_path, &stale).unwrap());
    assert!(lock_path.exists());

    assert!(break_lock(&lock_path, &fresh).unwrap());
    assert!(!lock_path.exists());
    assert!(!break_lock(&lock_path, &fresh).unwrap());
}
