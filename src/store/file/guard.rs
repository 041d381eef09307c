//! Exclusive group lock file with an RAII guard.

use super::metadata::GroupLockMetadata;
use crate::error::{Result, TaskLockError};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// RAII guard for the group lock file.
///
/// When dropped, the lock file is deleted, but only while it still carries
/// this guard's metadata: a lock broken as stale and re-taken by another
/// process is left alone. If deletion fails, a warning is logged but no
/// panic occurs.
#[derive(Debug)]
pub(super) struct GroupLockGuard {
    path: PathBuf,
    metadata: GroupLockMetadata,
    released: bool,
}

impl GroupLockGuard {
    /// Whether the lock file on disk is still the one this guard created.
    pub(super) fn is_held(&self) -> bool {
        GroupLockMetadata::from_file(&self.path)
            .is_ok_and(|current| current.same_holder(&self.metadata))
    }

    /// Release the lock, reporting a failed delete.
    pub(super) fn release(mut self) -> Result<()> {
        self.released = true;
        if !self.is_held() {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TaskLockError::StoreTransient(format!(
                "failed to release group lock '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Drop for GroupLockGuard {
    fn drop(&mut self) {
        if !self.released
            && self.is_held()
            && let Err(e) = fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to release group lock");
        }
    }
}

/// Outcome of one attempt to take the group lock.
pub(super) enum TryAcquire {
    Acquired(GroupLockGuard),
    /// Someone else holds it; their metadata if it could be read.
    Held(Option<GroupLockMetadata>),
}

/// Try once to create the lock file with create_new semantics.
pub(super) fn try_acquire(lock_path: &Path, metadata: &GroupLockMetadata) -> Result<TryAcquire> {
    if let Some(parent) = lock_path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            TaskLockError::StoreTransient(format!(
                "failed to create store directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Ok(TryAcquire::Held(GroupLockMetadata::from_file(lock_path).ok()));
        }
        Err(e) => {
            return Err(TaskLockError::StoreTransient(format!(
                "failed to acquire group lock '{}': {}",
                lock_path.display(),
                e
            )));
        }
    };

    let json = metadata.to_json()?;
    file.write_all(json.as_bytes()).map_err(|e| {
        let _ = fs::remove_file(lock_path);
        TaskLockError::StoreTransient(format!("failed to write group lock metadata: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(lock_path);
        TaskLockError::StoreTransient(format!("failed to sync group lock file: {}", e))
    })?;

    Ok(TryAcquire::Acquired(GroupLockGuard {
        path: lock_path.to_path_buf(),
        metadata: metadata.clone(),
        released: false,
    }))
}

/// Remove a lock file left behind by a crashed holder.
///
/// The file is only removed while it still carries `stale`, the metadata
/// that was judged abandoned; a lock re-taken in the meantime is kept.
/// Returns whether the file was removed.
pub(super) fn break_lock(lock_path: &Path, stale: &GroupLockMetadata) -> Result<bool> {
    let unchanged = GroupLockMetadata::from_file(lock_path)
        .is_ok_and(|current| current.same_holder(stale));
    if !unchanged {
        return Ok(false);
    }

    match fs::remove_file(lock_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(TaskLockError::StoreTransient(format!(
            "failed to break stale group lock '{}': {}",
            lock_path.display(),
            e
        ))),
    }
}
