use serde::{Deserialize, Serialize};

use crate::error::{JobError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueState {
    Started,
    Stopped,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueState::Started => write!(f, "started"),
            QueueState::Stopped => write!(f, "stopped"),
        }
    }
}

/// A named, prioritized, startable container of job items.
///
/// Lower priority values are served first. The display label is resolved
/// from the registry at read time and never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueue {
    pub name: String,
    pub unique_jobs: bool,
    pub state: QueueState,
    pub priority: i32,
}

impl JobQueue {
    pub fn new(name: &str, priority: i32, unique_jobs: bool) -> Self {
        Self {
            name: name.to_string(),
            unique_jobs,
            state: QueueState::Started,
            priority,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == QueueState::Started
    }

    /// Start the queue. Redundant starts are rejected, not absorbed.
    pub fn start(&mut self) -> Result<()> {
        if self.state == QueueState::Started {
            return Err(JobError::AlreadyStarted(self.name.clone()));
        }
        self.state = QueueState::Started;
        Ok(())
    }

    /// Stop the queue. Redundant stops are rejected, not absorbed.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == QueueState::Stopped {
            return Err(JobError::AlreadyStopped(self.name.clone()));
        }
        self.state = QueueState::Stopped;
        Ok(())
    }
}
