use thiserror::Error;

use crate::cluster::NodeId;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Duplicate job rejected, unique id {0} already queued")]
    PushRejected(String),

    #[error("No pending jobs in queue")]
    NoPendingJobs,

    #[error("Job queue {0} is already started")]
    AlreadyStarted(String),

    #[error("Job queue {0} is already stopped")]
    AlreadyStopped(String),

    #[error("Job {0} is not in the error state")]
    NotInErrorState(uuid::Uuid),

    #[error("Lock {0} is held elsewhere")]
    LockBusy(String),

    #[error("Job type already registered: {0}")]
    DuplicateJobType(String),

    #[error("Queue already registered: {0}")]
    DuplicateQueue(String),

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Job queue not found: {0}")]
    QueueNotFound(String),

    #[error("Job not found: {0}")]
    ItemNotFound(uuid::Uuid),

    #[error("Worker {node}/{pid} is not running on this node")]
    NotLocalWorker { node: NodeId, pid: u32 },

    #[error("Invalid payload for job type {job_type}: {reason}")]
    InvalidPayload { job_type: String, reason: String },

    /// Failure reported by a job function. Recorded on the item as its
    /// result; never propagated past the worker boundary.
    #[error("Job failed: {0}")]
    JobFailed(String),
}

pub type Result<T> = std::result::Result<T, JobError>;
