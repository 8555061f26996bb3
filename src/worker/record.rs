use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cluster::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    Running,
    Dead,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Running => write!(f, "running"),
            WorkerState::Dead => write!(f, "dead"),
        }
    }
}

/// Binds a node and worker pid to the job item it is executing.
///
/// Created by the worker before it invokes the job function, deleted by the
/// worker on exit or by the reconciler when the worker died without cleanup.
/// The (node, pid) pair is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub node: NodeId,
    pub pid: u32,
    pub job_item_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub heartbeat: DateTime<Utc>,
    pub state: WorkerState,
}

impl WorkerRecord {
    pub fn new(node: NodeId, pid: u32, job_item_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            node,
            pid,
            job_item_id,
            created_at: now,
            heartbeat: now,
            state: WorkerState::Running,
        }
    }
}

impl std::fmt::Display for WorkerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.node, self.pid)
    }
}
