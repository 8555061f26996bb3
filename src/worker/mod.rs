//! Worker execution engine.
//!
//! - [`WorkerRecord`]: the persisted binding of node + pid to the item being
//!   executed
//! - [`WorkerPool`]: spawns one panic-isolated task per job and reports
//!   results over a channel
//!
//! # Execution flow
//!
//! 1. Dispatcher marks an item Processing and hands it to the pool
//! 2. The worker registers its [`WorkerRecord`] before touching the job
//! 3. The job function runs at a single invocation boundary
//! 4. Clean return deletes the item; an error or panic records the Error
//!    state with the failure detail
//! 5. The worker deletes its own record last, on every path short of a kill

pub mod pool;
pub mod record;

pub use pool::{WorkerExit, WorkerOutcome, WorkerPool};
pub use record::{WorkerRecord, WorkerState};
