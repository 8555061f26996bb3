use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::cluster::NodeId;
use crate::error::{JobError, Result};
use crate::queue::item::JobQueueItem;
use crate::queue::store::SharedStore;
use crate::registry::Registry;

/// Result of one worker run, reported over the exit channel.
#[derive(Debug, Clone)]
pub struct WorkerExit {
    pub pid: u32,
    pub item_id: Uuid,
    pub outcome: WorkerOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Job returned cleanly; its item was deleted.
    Completed,
    /// Job returned an error or panicked; its item holds the detail.
    Failed(String),
    /// Worker was terminated mid-job. Item and record are left for the
    /// reconciler, same as a crashed OS process.
    Killed,
}

/// Runs jobs for one node, each on its own task.
///
/// A job runs behind a spawn boundary, so a panicking job is converted into
/// a failure at the join and can never take the dispatcher down. The pool
/// allocates the worker pids recorded in the store and publishes the set of
/// live pids, which is what the membership layer reports in heartbeats.
pub struct WorkerPool {
    node: NodeId,
    store: SharedStore,
    registry: Arc<Registry>,
    running: Mutex<HashMap<u32, AbortHandle>>,
    next_pid: AtomicU32,
    exits: Mutex<Option<mpsc::UnboundedSender<WorkerExit>>>,
}

impl WorkerPool {
    pub fn new(node: NodeId, store: SharedStore, registry: Arc<Registry>) -> Arc<Self> {
        Arc::new(Self {
            node,
            store,
            registry,
            running: Mutex::new(HashMap::new()),
            next_pid: AtomicU32::new(1),
            exits: Mutex::new(None),
        })
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Install a channel receiving a [`WorkerExit`] per finished worker.
    pub fn exit_notifications(&self) -> mpsc::UnboundedReceiver<WorkerExit> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.exits.lock().expect("exit channel lock poisoned") = Some(tx);
        rx
    }

    /// Pids of workers currently executing on this node.
    pub fn live_pids(&self) -> Vec<u32> {
        self.running
            .lock()
            .expect("running table poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// Start a worker for an item already marked Processing. Returns the
    /// worker pid.
    pub fn spawn(self: &Arc<Self>, item: JobQueueItem) -> u32 {
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        let pool = self.clone();
        tokio::spawn(async move {
            pool.run_worker(pid, item).await;
        });
        pid
    }

    /// Kill a worker on this node. A worker that already finished is not an
    /// error. Store cleanup for a killed worker is left to the reconciler,
    /// exactly as for a crashed process.
    pub fn terminate(&self, node: &NodeId, pid: u32) -> Result<()> {
        if node != &self.node {
            return Err(JobError::NotLocalWorker {
                node: node.clone(),
                pid,
            });
        }
        let handle = self
            .running
            .lock()
            .expect("running table poisoned")
            .remove(&pid);
        match handle {
            Some(handle) => {
                handle.abort();
                tracing::info!(pid, "Worker terminated");
                Ok(())
            }
            // Finished before we got here.
            None => Ok(()),
        }
    }

    /// The worker body.
    ///
    /// Registers its record, invokes the job at a single boundary, finalizes
    /// the item, and deletes its own record last. Every path through here
    /// except a kill ends with the record gone.
    async fn run_worker(self: Arc<Self>, pid: u32, item: JobQueueItem) {
        {
            let mut store = self.store.write().await;
            store.register_worker(self.node.clone(), pid, Some(item.id));
        }
        tracing::info!(pid, item = %item, job_type = %item.job_type, "Worker started");

        let job_type = match self.registry.job_type(&item.job_type) {
            Ok(job_type) => job_type.clone(),
            Err(e) => {
                self.finalize(pid, &item, WorkerOutcome::Failed(e.to_string()))
                    .await;
                return;
            }
        };

        let invocation = tokio::spawn(job_type.invoke(item.kwargs.clone()));
        self.running
            .lock()
            .expect("running table poisoned")
            .insert(pid, invocation.abort_handle());

        let outcome = match invocation.await {
            Ok(Ok(())) => WorkerOutcome::Completed,
            Ok(Err(e)) => WorkerOutcome::Failed(e.to_string()),
            Err(join_err) if join_err.is_panic() => {
                let panic = join_err.into_panic();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "job panicked".to_string());
                WorkerOutcome::Failed(format!("panic: {message}"))
            }
            Err(_) => WorkerOutcome::Killed,
        };

        self.running
            .lock()
            .expect("running table poisoned")
            .remove(&pid);
        self.finalize(pid, &item, outcome).await;
    }

    async fn finalize(&self, pid: u32, item: &JobQueueItem, outcome: WorkerOutcome) {
        match &outcome {
            WorkerOutcome::Completed => {
                let mut store = self.store.write().await;
                if let Err(e) = store.complete(item.id) {
                    tracing::warn!(item = %item, error = %e, "Finished job vanished from store");
                }
                store.delete_worker(&self.node, pid);
                tracing::info!(pid, item = %item, "Worker finished");
            }
            WorkerOutcome::Failed(reason) => {
                let mut store = self.store.write().await;
                if let Err(e) = store.fail(item.id, reason.clone()) {
                    tracing::warn!(item = %item, error = %e, "Failed job vanished from store");
                }
                store.delete_worker(&self.node, pid);
                tracing::warn!(pid, item = %item, reason, "Worker failed");
            }
            WorkerOutcome::Killed => {
                // No store cleanup: the reconciler will observe the dead pid
                // and force-requeue the item.
                tracing::warn!(pid, item = %item, "Worker killed mid-job");
            }
        }

        let exits = self.exits.lock().expect("exit channel lock poisoned");
        if let Some(tx) = exits.as_ref() {
            let _ = tx.send(WorkerExit {
                pid,
                item_id: item.id,
                outcome,
            });
        }
    }
}
