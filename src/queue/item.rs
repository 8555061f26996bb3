use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// How much of the unique id to show in display output.
const UNIQUE_ID_DISPLAY_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Processing,
    Error,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Processing => write!(f, "processing"),
            JobState::Error => write!(f, "error"),
        }
    }
}

/// One persisted unit of work, owned by exactly one queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueueItem {
    pub id: Uuid,
    pub queue_name: String,
    pub job_type: String,
    /// Opaque serialized argument bag; its schema belongs to the job type.
    pub kwargs: Value,
    pub state: JobState,
    /// Dedup key: content hash of type+kwargs on dedup queues, random otherwise.
    pub unique_id: String,
    /// Assigned once at push. FIFO order within the queue; refreshed only by
    /// a non-at-top requeue.
    pub created_at: DateTime<Utc>,
    /// Failure detail, present in the Error state only.
    pub result: Option<String>,
}

impl JobQueueItem {
    pub fn new(queue_name: &str, job_type: &str, kwargs: Value, unique_jobs: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue_name: queue_name.to_string(),
            job_type: job_type.to_string(),
            unique_id: compute_unique_id(job_type, &kwargs, unique_jobs),
            kwargs,
            state: JobState::Pending,
            created_at: Utc::now(),
            result: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == JobState::Pending
    }

    pub fn is_processing(&self) -> bool {
        self.state == JobState::Processing
    }

    pub fn is_error(&self) -> bool {
        self.state == JobState::Error
    }
}

impl std::fmt::Display for JobQueueItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.unique_id.len() > UNIQUE_ID_DISPLAY_LENGTH {
            write!(f, "{}...", &self.unique_id[..UNIQUE_ID_DISPLAY_LENGTH])
        } else {
            write!(f, "{}", self.unique_id)
        }
    }
}

/// Dedup key for an item. On dedup queues this is a content hash, so two
/// pushes of the same type and arguments collide; otherwise a random uuid.
pub fn compute_unique_id(job_type: &str, kwargs: &Value, unique_jobs: bool) -> String {
    if unique_jobs {
        let mut hasher = Sha256::new();
        hasher.update(job_type.as_bytes());
        hasher.update(b"-");
        hasher.update(kwargs.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    } else {
        Uuid::new_v4().to_string()
    }
}
