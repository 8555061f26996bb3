//! Per-node poll tick.
//!
//! Each tick tries the node-scoped poll lock without waiting, takes a
//! resource snapshot, and admits at most one job: the oldest pending item of
//! the first started queue in priority order. Bounding admission this way
//! turns a fast poll loop into simple admission control.

use std::sync::Arc;

use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

use crate::cluster::{NodeId, NodeResources};
use crate::config::SchedulerConfig;
use crate::error::{JobError, Result};
use crate::lock::LockService;
use crate::queue::item::JobQueueItem;
use crate::queue::store::SharedStore;
use crate::worker::pool::WorkerPool;

/// Name of the lock serializing poll ticks for a node.
pub const POLL_LOCK_ID: &str = "job_queue_poll";

pub struct Dispatcher {
    node: NodeId,
    store: SharedStore,
    pool: Arc<WorkerPool>,
    locks: Arc<dyn LockService>,
    resources: Arc<dyn NodeResources>,
    config: SchedulerConfig,
}

impl Dispatcher {
    pub fn new(
        node: NodeId,
        store: SharedStore,
        pool: Arc<WorkerPool>,
        locks: Arc<dyn LockService>,
        resources: Arc<dyn NodeResources>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            node,
            store,
            pool,
            locks,
            resources,
            config,
        })
    }

    /// One poll tick. Returns the dispatched item, `None` when there was
    /// nothing to do or a ceiling held us back, and [`JobError::LockBusy`]
    /// when another tick holds the lock. The lock guard is dropped on every
    /// exit path.
    pub async fn tick(&self) -> Result<Option<JobQueueItem>> {
        let _guard = self.locks.acquire(POLL_LOCK_ID)?;

        let cpu_load = self.resources.cpu_load();
        let memory_usage = self.resources.memory_usage();
        let worker_count = self.store.read().await.worker_count(&self.node);

        let ceilings = &self.config.admission;
        if cpu_load > ceilings.max_cpu_load
            || memory_usage > ceilings.max_memory_usage
            || worker_count >= ceilings.max_workers
        {
            tracing::debug!(
                cpu_load,
                memory_usage,
                worker_count,
                "Admission ceiling exceeded, skipping tick"
            );
            return Ok(None);
        }

        let picked = {
            let mut store = self.store.write().await;
            let candidates: Vec<String> = store
                .queues_by_priority()
                .iter()
                .filter(|queue| queue.is_running())
                .map(|queue| queue.name.clone())
                .collect();

            let mut picked: Option<JobQueueItem> = None;
            for queue_name in candidates {
                let found = match store.get_oldest_pending_job(&queue_name) {
                    Ok(item) => item.clone(),
                    Err(JobError::NoPendingJobs) => continue,
                    Err(e) => return Err(e),
                };
                // Persisted before the worker exists: a crash in the gap is
                // recovered like any crashed worker.
                store.mark_processing(found.id)?;
                picked = Some(found);
                break;
            }
            picked
        };

        match picked {
            Some(item) => {
                let pid = self.pool.spawn(item.clone());
                tracing::info!(
                    queue = %item.queue_name,
                    job_type = %item.job_type,
                    item = %item,
                    pid,
                    "Job dispatched"
                );
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Poll loop: one tick per interval until the token is cancelled.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(_) => {}
                        Err(JobError::LockBusy(_)) => {
                            // Another tick is in its critical section.
                            tracing::trace!("Poll lock busy, skipping tick");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Poll tick failed");
                        }
                    }
                }
                _ = token.cancelled() => {
                    tracing::info!("Dispatcher shutting down");
                    break;
                }
            }
        }
    }
}
