//! Record files.
//!
//! A record `{key}.json` is replaced by writing `{key}.tmp` beside it,
//! syncing it, and renaming it into place. Readers only open `.json` files,
//! so a `.tmp` left by a crash is never read as a record; the next write of
//! the same key overwrites it.

use crate::error::{Result, TaskLockError};
use crate::record::LockRecord;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Write `record` to `path` so that readers see either the old file or the
/// complete new one.
pub(super) fn write_record(path: &Path, record: &LockRecord) -> Result<()> {
    let json = record.to_json()?;
    let temp_path = path.with_extension("tmp");

    let written = write_synced(&temp_path, json.as_bytes()).and_then(|()| fs::rename(&temp_path, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(TaskLockError::StoreTransient(format!(
            "failed to write record '{}': {}",
            path.display(),
            e
        )));
    }

    // Persist the directory entry of the rename.
    #[cfg(unix)]
    {
        if let Some(dir) = path.parent()
            && let Ok(dir) = File::open(dir)
        {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

/// Delete the record file at `path`. A missing file is not an error.
pub(super) fn remove_record(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TaskLockError::StoreTransient(format!(
            "failed to delete record '{}': {}",
            path.display(),
            e
        ))),
    }
}

fn write_synced(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}
