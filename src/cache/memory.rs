//! In-process fast cache.

use super::{FastCache, Versioned};
use crate::error::{Result, TaskLockError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Mutex-guarded map with a version counter per write.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Versioned>>,
    next_version: Mutex<u64>,
    unavailable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, as if the cache service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    /// Raw value stored under `key`.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.lock_entries().get(key).map(|v| v.value.clone())
    }

    /// Overwrite `key` unconditionally.
    pub fn put(&self, key: &str, value: String) {
        let version = self.bump_version();
        self.lock_entries()
            .insert(key.to_string(), Versioned { value, version });
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Versioned>> {
        self.entries.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn bump_version(&self) -> u64 {
        let mut next = self
            .next_version
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        *next += 1;
        *next
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TaskLockError::Cache("cache service unavailable".to_string()));
        }
        Ok(())
    }
}

impl FastCache for MemoryCache {
    fn contains(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.lock_entries().contains_key(key))
    }

    fn get_versioned(&self, key: &str) -> Result<Option<Versioned>> {
        self.check_available()?;
        Ok(self.lock_entries().get(key).cloned())
    }

    fn put_if_absent(&self, key: &str, value: String) -> Result<bool> {
        self.check_available()?;
        let version = self.bump_version();
        let mut entries = self.lock_entries();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Versioned { value, version });
        Ok(true)
    }

    fn compare_and_swap(&self, key: &str, expected_version: u64, value: String) -> Result<bool> {
        self.check_available()?;
        let version = self.bump_version();
        let mut entries = self.lock_entries();
        match entries.get_mut(key) {
            Some(current) if current.version == expected_version => {
                *current = Versioned { value, version };
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
