pub mod cluster;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lock;
pub mod queue;
pub mod reconciler;
pub mod registry;
pub mod shutdown;
pub mod worker;

pub use cluster::{ClusterEvent, NodeId};
pub use config::SchedulerConfig;
pub use dispatcher::Dispatcher;
pub use error::{JobError, Result};
pub use queue::{JobQueue, JobQueueItem, JobState, JobStore};
pub use reconciler::Reconciler;
pub use registry::{Registry, RegistryBuilder};
pub use worker::{WorkerPool, WorkerRecord};
