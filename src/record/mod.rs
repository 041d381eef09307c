//! Lock record model.
//!
//! - [`LockKey`]: `(resource_id, task_type)`, one logical exclusive resource
//! - [`LockRecord`]: the durable "who holds this lock and until when"
//! - [`TaskType`]: the kinds of exclusive work, each with its own lease length
//! - [`LockId`]: a client-generated id, unique per acquisition attempt
//!
//! All records live under the single group key [`GROUP_KEY`] so the store can
//! serialize transactional writes against them.

mod lock_id;
mod task_type;
mod types;


// Re-export public API
pub use lock_id::LockId;
pub(crate) use lock_id::get_owner_string;
pub use task_type::TaskType;
pub use types::{GROUP_KEY, LockKey, LockRecord, RecordKey, RecordState};
