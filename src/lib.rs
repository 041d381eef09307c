//! Tasklock: lease-based exclusive locks for background tasks.
//!
//! Processes that may run the same background task (deleting a form,
//! generating an export, migrating a table) take a lock on
//! `(resource, task type)` before starting. Locks live in a
//! [`DurableStore`](store::DurableStore) that only needs group-serialized
//! transactions; an optional [`FastCache`](cache::FastCache) helps notice a
//! competing claim the store does not show yet.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tasklock::manager::LockManager;
//! use tasklock::record::{LockId, TaskType};
//! use tasklock::store::FileStore;
//!
//! # fn main() -> tasklock::error::Result<()> {
//! let store = FileStore::open(".tasklock")?;
//! let manager = LockManager::builder(Arc::new(store)).build()?;
//! let lock_id = LockId::generate();
//!
//! if manager.obtain_lock(&lock_id, "form-1", TaskType::FormDeletion) {
//!     // ... do the work, renewing before the timeout ...
//!     manager.release_lock(&lock_id, "form-1", TaskType::FormDeletion)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod manager;
pub mod metrics;
pub mod record;
pub mod resolver;
pub mod store;

pub use error::{Result, TaskLockError};
pub use manager::{LockManager, LockManagerBuilder};
