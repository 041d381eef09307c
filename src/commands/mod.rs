//! Command implementations for tasklock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every lock command runs against a file-backed store
//! without a fast cache.

use crate::cli::{Cli, Command, LockArgs, TargetArgs};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tasklock::config::Config;
use tasklock::error::{Result, TaskLockError};
use tasklock::logging::init_logging;
use tasklock::manager::LockManager;
use tasklock::record::{LockId, LockKey, RecordState, TaskType};
use tasklock::store::FileStore;

/// Dispatch a command to its implementation.
///
/// Loads the configuration, installs logging, and for lock commands opens
/// the store before running the handler.
pub fn dispatch(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    init_logging(&config.logging)?;

    match cli.command {
        Command::NewId => cmd_new_id(),
        Command::TaskTypes => cmd_task_types(),
        command => {
            let manager = open_manager(&cli.store, config)?;
            run(&manager, command)
        }
    }
}

/// Follow-up advice printed after an error, if any.
pub fn error_hint(err: &TaskLockError) -> Option<&'static str> {
    match err {
        TaskLockError::CacheCollision => Some("retry with a fresh id from `tasklock new-id`"),
        err if err.is_retryable() => Some("the lock may be free shortly; retry the same command"),
        _ => None,
    }
}

/// Build a lock manager over the file store at `store_dir`.
fn open_manager(store_dir: &Path, config: Config) -> Result<LockManager> {
    let store = FileStore::open(store_dir)?;
    LockManager::builder(Arc::new(store)).config(config).build()
}

/// Run a lock command.
fn run(manager: &LockManager, command: Command) -> Result<()> {
    match command {
        Command::Obtain(args) => cmd_obtain(manager, args),
        Command::Renew(args) => cmd_renew(manager, args),
        Command::Release(args) => cmd_release(manager, args),
        Command::Verify(args) => cmd_verify(manager, args),
        Command::Cleanup(args) => cmd_cleanup(manager, args),
        Command::List(args) => cmd_list(manager, args),
        Command::NewId | Command::TaskTypes => Err(TaskLockError::UserError(
            "command does not use the lock store".to_string(),
        )),
    }
}

fn cmd_new_id() -> Result<()> {
    println!("{}", LockId::generate());
    Ok(())
}

fn cmd_task_types() -> Result<()> {
    for task_type in TaskType::ALL {
        println!(
            "  {:26} {:>4}s",
            task_type.name(),
            task_type.lock_timeout().num_seconds()
        );
    }
    Ok(())
}

fn cmd_obtain(manager: &LockManager, args: LockArgs) -> Result<()> {
    let lock_id = LockId::from(args.lock_id);
    let TargetArgs { resource, task_type } = args.target;

    if !manager.obtain_lock(&lock_id, &resource, task_type) {
        return Err(TaskLockError::NotAcquired(format!(
            "could not obtain lock on {}",
            LockKey::new(resource, task_type)
        )));
    }

    print_held(manager, &resource, task_type, "Obtained")
}

fn cmd_renew(manager: &LockManager, args: LockArgs) -> Result<()> {
    let lock_id = LockId::from(args.lock_id);
    let TargetArgs { resource, task_type } = args.target;

    if !manager.renew_lock(&lock_id, &resource, task_type) {
        return Err(TaskLockError::NotAcquired(format!(
            "could not renew lock on {}",
            LockKey::new(resource, task_type)
        )));
    }

    print_held(manager, &resource, task_type, "Renewed")
}

fn cmd_release(manager: &LockManager, args: LockArgs) -> Result<()> {
    let lock_id = LockId::from(args.lock_id);
    let TargetArgs { resource, task_type } = args.target;

    manager.release_lock(&lock_id, &resource, task_type)?;
    println!("Released lock on {}", LockKey::new(resource, task_type));
    Ok(())
}

fn cmd_verify(manager: &LockManager, args: LockArgs) -> Result<()> {
    let lock_id = LockId::from(args.lock_id);
    let TargetArgs { resource, task_type } = args.target;

    manager.verify_lock(&lock_id, &resource, task_type)?;
    println!("{} holds {}", lock_id, LockKey::new(resource, task_type));
    Ok(())
}

fn cmd_cleanup(manager: &LockManager, args: LockArgs) -> Result<()> {
    let lock_id = LockId::from(args.lock_id);
    let TargetArgs { resource, task_type } = args.target;

    let deleted = manager.cleanup(&lock_id, &resource, task_type);
    println!("Deleted {} record(s) for {}", deleted, LockKey::new(resource, task_type));
    Ok(())
}

fn cmd_list(manager: &LockManager, args: TargetArgs) -> Result<()> {
    let key = LockKey::new(args.resource, args.task_type);
    let records = manager.list_records(&key.resource_id, key.task_type)?;

    if records.is_empty() {
        println!("No records for {}.", key);
        return Ok(());
    }

    // A near tie leaves no holder; the records are still worth showing.
    let holder = match manager.active_lock(&key.resource_id, key.task_type) {
        Ok(active) => active.map(|r| r.key),
        Err(TaskLockError::Contention) => None,
        Err(e) => return Err(e),
    };
    let now = Utc::now();
    let window = manager.config().stale_record_window();

    println!("Records for {} ({}):", key, records.len());
    println!();
    for record in &records {
        let state = match record.state(now, window) {
            RecordState::Live if holder.as_ref() == Some(&record.key) => "ACTIVE",
            RecordState::Live => "contending",
            RecordState::Expired => "expired",
            RecordState::Stale => "stale",
        };
        println!("  {}:", record.key);
        println!("    Lock id:    {}", record.lock_id);
        println!(
            "    Expires:    {}",
            record.expires_at.format("%Y-%m-%d %H:%M:%S%.3f UTC")
        );
        println!("    State:      {}", state);
        println!();
    }

    Ok(())
}

fn print_held(manager: &LockManager, resource: &str, task_type: TaskType, verb: &str) -> Result<()> {
    let key = LockKey::new(resource, task_type);
    match manager.active_lock(resource, task_type)? {
        Some(record) => println!(
            "{} lock on {} until {}",
            verb,
            key,
            record.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("{} lock on {}", verb, key),
    }
    Ok(())
}
