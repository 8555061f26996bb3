//! Queue model and state machine.
//!
//! - [`JobQueue`]: named, prioritized, startable container of items
//! - [`JobQueueItem`]: one persisted unit of work with its dedup key
//! - [`JobStore`]: the three tables (queues, items, worker records) and
//!   every state transition over them
//!
//! # Item lifecycle
//!
//! Pending -> Processing -> deleted on success, or Error on failure.
//! Error -> Pending via operator requeue; Processing -> Pending only via
//! forced requeue (crash recovery).

pub mod item;
pub mod queue;
pub mod store;

pub use item::{JobQueueItem, JobState};
pub use queue::{JobQueue, QueueState};
pub use store::{JobStore, SharedStore};
