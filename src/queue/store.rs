//! The job store: queues, items, and worker records.
//!
//! These three tables are the only shared mutable state in the scheduler.
//! Every state transition (push, dispatch, finalize, requeue, worker CRUD)
//! is a single method call taken under one write lock, which is what makes
//! it a local transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::cluster::NodeId;
use crate::error::{JobError, Result};
use crate::queue::item::{JobQueueItem, JobState};
use crate::queue::queue::JobQueue;
use crate::registry::Registry;
use crate::worker::record::{WorkerRecord, WorkerState};

/// Store handle shared between the dispatcher, workers, and reconciler.
pub type SharedStore = Arc<RwLock<JobStore>>;

#[derive(Debug, Default)]
pub struct JobStore {
    queues: HashMap<String, JobQueue>,
    items: HashMap<Uuid, JobQueueItem>,
    /// unique_id -> item id, enforcing global dedup-key uniqueness.
    unique_index: HashMap<String, Uuid>,
    workers: HashMap<(NodeId, u32), WorkerRecord>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::new()))
    }

    // === Queues ===

    /// Upsert every queue the registry declares. Existing queues keep their
    /// state and items; priority and dedup policy follow the registry.
    /// Queues are never deleted here.
    pub fn register_queues(&mut self, registry: &Registry) {
        for def in registry.queue_definitions() {
            let queue = self
                .queues
                .entry(def.name.clone())
                .or_insert_with(|| JobQueue::new(&def.name, def.priority, def.unique_jobs));
            queue.priority = def.priority;
            queue.unique_jobs = def.unique_jobs;
            tracing::debug!(queue = %def.name, priority = def.priority, "Queue upserted");
        }
    }

    /// Fetch a queue, creating it Started if absent.
    pub fn get_or_create_queue(&mut self, name: &str, priority: i32, unique_jobs: bool) -> &JobQueue {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| JobQueue::new(name, priority, unique_jobs))
    }

    pub fn queue(&self, name: &str) -> Result<&JobQueue> {
        self.queues
            .get(name)
            .ok_or_else(|| JobError::QueueNotFound(name.to_string()))
    }

    /// Queues in dispatch order: ascending priority, name as tie-breaker.
    pub fn queues_by_priority(&self) -> Vec<&JobQueue> {
        let mut queues: Vec<&JobQueue> = self.queues.values().collect();
        queues.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        queues
    }

    pub fn start_queue(&mut self, name: &str) -> Result<()> {
        self.queue_mut(name)?.start()
    }

    pub fn stop_queue(&mut self, name: &str) -> Result<()> {
        self.queue_mut(name)?.stop()
    }

    /// Delete every item in the queue regardless of state. Administrative.
    pub fn empty_queue(&mut self, name: &str) -> Result<usize> {
        self.queue(name)?;
        let doomed: Vec<Uuid> = self
            .items
            .values()
            .filter(|item| item.queue_name == name)
            .map(|item| item.id)
            .collect();
        for id in &doomed {
            if let Some(item) = self.items.remove(id) {
                self.unique_index.remove(&item.unique_id);
            }
        }
        tracing::info!(queue = name, removed = doomed.len(), "Queue emptied");
        Ok(doomed.len())
    }

    fn queue_mut(&mut self, name: &str) -> Result<&mut JobQueue> {
        self.queues
            .get_mut(name)
            .ok_or_else(|| JobError::QueueNotFound(name.to_string()))
    }

    // === Items ===

    /// Push a job onto a queue.
    ///
    /// The payload is validated against the registered job type here, so a
    /// caller mistake fails the push instead of surfacing later inside the
    /// worker. On dedup queues an identical outstanding job makes this fail
    /// with [`JobError::PushRejected`]; nothing is coalesced silently.
    pub fn push(
        &mut self,
        registry: &Registry,
        queue_name: &str,
        job_type: &str,
        kwargs: Value,
    ) -> Result<JobQueueItem> {
        let job_type_entry = registry.job_type(job_type)?;
        job_type_entry.validate(&kwargs)?;
        let queue = self.queue(queue_name)?;

        let item = JobQueueItem::new(queue_name, job_type, kwargs, queue.unique_jobs);
        if self.unique_index.contains_key(&item.unique_id) {
            return Err(JobError::PushRejected(item.unique_id));
        }

        self.unique_index.insert(item.unique_id.clone(), item.id);
        self.items.insert(item.id, item.clone());
        tracing::debug!(queue = queue_name, job_type, item = %item, "Job pushed");
        Ok(item)
    }

    pub fn item(&self, id: Uuid) -> Result<&JobQueueItem> {
        self.items.get(&id).ok_or(JobError::ItemNotFound(id))
    }

    /// Earliest-created pending item in the queue. Strict FIFO; ties only at
    /// identical timestamps, broken by id for determinism.
    pub fn get_oldest_pending_job(&self, queue_name: &str) -> Result<&JobQueueItem> {
        self.items
            .values()
            .filter(|item| item.queue_name == queue_name && item.is_pending())
            .min_by_key(|item| (item.created_at, item.id))
            .ok_or(JobError::NoPendingJobs)
    }

    pub fn pending_jobs(&self, queue_name: &str) -> Vec<&JobQueueItem> {
        self.jobs_in_state(queue_name, JobState::Pending)
    }

    pub fn active_jobs(&self, queue_name: &str) -> Vec<&JobQueueItem> {
        self.jobs_in_state(queue_name, JobState::Processing)
    }

    pub fn error_jobs(&self, queue_name: &str) -> Vec<&JobQueueItem> {
        self.jobs_in_state(queue_name, JobState::Error)
    }

    fn jobs_in_state(&self, queue_name: &str, state: JobState) -> Vec<&JobQueueItem> {
        let mut jobs: Vec<&JobQueueItem> = self
            .items
            .values()
            .filter(|item| item.queue_name == queue_name && item.state == state)
            .collect();
        jobs.sort_by_key(|item| (item.created_at, item.id));
        jobs
    }

    /// Pending -> Processing. Persisted before the worker is spawned, so a
    /// crash in the gap looks exactly like a crashed worker and is recovered
    /// the same way.
    pub fn mark_processing(&mut self, id: Uuid) -> Result<()> {
        let item = self.item_mut(id)?;
        item.state = JobState::Processing;
        Ok(())
    }

    /// Successful completion: the item is deleted outright.
    pub fn complete(&mut self, id: Uuid) -> Result<()> {
        let item = self.items.remove(&id).ok_or(JobError::ItemNotFound(id))?;
        self.unique_index.remove(&item.unique_id);
        tracing::debug!(item = %item, "Job completed and removed");
        Ok(())
    }

    /// Failure: the item stays, in the Error state, with the failure detail.
    pub fn fail(&mut self, id: Uuid, result: String) -> Result<()> {
        let item = self.item_mut(id)?;
        item.state = JobState::Error;
        item.result = Some(result);
        Ok(())
    }

    /// Put a job back in the Pending state.
    ///
    /// Without `force` only Error items may be requeued; anything else is
    /// [`JobError::NotInErrorState`]. With `force` any state goes back to
    /// Pending (crash recovery). `at_top` keeps the original creation
    /// timestamp so a crash-recovered job is not sent to the back of the
    /// queue; otherwise the timestamp is refreshed to now.
    pub fn requeue(&mut self, id: Uuid, force: bool, at_top: bool) -> Result<()> {
        let item = self.item_mut(id)?;
        if !force && item.state != JobState::Error {
            return Err(JobError::NotInErrorState(id));
        }
        item.state = JobState::Pending;
        if !at_top {
            item.created_at = Utc::now();
        }
        tracing::info!(item = %item, force, at_top, "Job requeued");
        Ok(())
    }

    fn item_mut(&mut self, id: Uuid) -> Result<&mut JobQueueItem> {
        self.items.get_mut(&id).ok_or(JobError::ItemNotFound(id))
    }

    // === Worker records ===

    /// Create or refresh the record for (node, pid) and attach the item it
    /// is executing.
    pub fn register_worker(&mut self, node: NodeId, pid: u32, job_item_id: Option<Uuid>) {
        let record = self
            .workers
            .entry((node.clone(), pid))
            .or_insert_with(|| WorkerRecord::new(node, pid, job_item_id));
        record.job_item_id = job_item_id;
        record.heartbeat = Utc::now();
        record.state = WorkerState::Running;
    }

    pub fn delete_worker(&mut self, node: &NodeId, pid: u32) -> Option<WorkerRecord> {
        self.workers.remove(&(node.clone(), pid))
    }

    pub fn worker(&self, node: &NodeId, pid: u32) -> Option<&WorkerRecord> {
        self.workers.get(&(node.clone(), pid))
    }

    pub fn worker_count(&self, node: &NodeId) -> usize {
        self.workers.keys().filter(|(n, _)| n == node).count()
    }

    pub fn workers_for_node(&self, node: &NodeId) -> Vec<&WorkerRecord> {
        self.workers.values().filter(|w| &w.node == node).collect()
    }

    pub fn all_workers(&self) -> Vec<&WorkerRecord> {
        self.workers.values().collect()
    }

    pub fn touch_worker(&mut self, node: &NodeId, pid: u32) {
        if let Some(record) = self.workers.get_mut(&(node.clone(), pid)) {
            record.heartbeat = Utc::now();
        }
    }

    pub fn mark_worker_dead(&mut self, node: &NodeId, pid: u32) {
        if let Some(record) = self.workers.get_mut(&(node.clone(), pid)) {
            record.state = WorkerState::Dead;
        }
    }

    /// Processing items no live worker record points at. These are the jobs
    /// whose worker died without cleanup; the reconciler requeues them.
    pub fn orphaned_processing_items(&self) -> Vec<Uuid> {
        let claimed: std::collections::HashSet<Uuid> = self
            .workers
            .values()
            .filter_map(|w| w.job_item_id)
            .collect();
        self.items
            .values()
            .filter(|item| item.is_processing() && !claimed.contains(&item.id))
            .map(|item| item.id)
            .collect()
    }
}
