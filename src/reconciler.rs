//! Crash detection and repair.
//!
//! Workers that die without cleanup leave a Processing item behind, with or
//! without a stale worker record. The reconciler resolves every such
//! inconsistency the same way: force-requeue the item at the top of its
//! queue, then drop the stale record. A job is never failed permanently from
//! here.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterEvent, NodeId};
use crate::error::{JobError, Result};
use crate::lock::LockService;
use crate::queue::store::SharedStore;

/// Name of the lock serializing dead-job sweeps.
pub const SWEEP_LOCK_ID: &str = "dead_job_sweep";

pub struct Reconciler {
    store: SharedStore,
    locks: Arc<dyn LockService>,
    sweep_interval_ms: u64,
}

impl Reconciler {
    pub fn new(store: SharedStore, locks: Arc<dyn LockService>, sweep_interval_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            store,
            locks,
            sweep_interval_ms,
        })
    }

    /// Requeue every Processing item with no live worker record at all.
    /// Lock-protected against concurrent sweeps; idempotent, since a
    /// requeued item is Pending and no longer matches.
    pub async fn sweep(&self) -> Result<usize> {
        let _guard = self.locks.acquire(SWEEP_LOCK_ID)?;

        let mut store = self.store.write().await;
        let orphans = store.orphaned_processing_items();
        for item_id in &orphans {
            if let Err(e) = store.requeue(*item_id, true, true) {
                tracing::warn!(item_id = %item_id, error = %e, "Orphan requeue failed");
            }
        }
        if !orphans.is_empty() {
            tracing::info!(requeued = orphans.len(), "Dead job sweep requeued orphans");
        }
        Ok(orphans.len())
    }

    /// A node reported its live worker pids. Any record for that node whose
    /// pid is missing from the set is stale: its job goes back to the front
    /// of the queue and the record is deleted. Live records get their
    /// heartbeat touched.
    pub async fn handle_heartbeat(&self, node: &NodeId, live_pids: &[u32]) -> usize {
        let live: HashSet<u32> = live_pids.iter().copied().collect();
        let mut store = self.store.write().await;

        let records: Vec<(u32, Option<uuid::Uuid>)> = store
            .workers_for_node(node)
            .iter()
            .map(|record| (record.pid, record.job_item_id))
            .collect();

        let mut repaired = 0;
        for (pid, item_id) in records {
            if live.contains(&pid) {
                store.touch_worker(node, pid);
                continue;
            }
            store.mark_worker_dead(node, pid);
            if let Some(item_id) = item_id {
                match store.requeue(item_id, true, true) {
                    Ok(()) => repaired += 1,
                    Err(e) => {
                        tracing::warn!(item_id = %item_id, error = %e, "Stale worker requeue failed")
                    }
                }
            }
            store.delete_worker(node, pid);
            tracing::info!(node = %node, pid, "Stale worker record removed");
        }
        repaired
    }

    /// A node died: every one of its worker records is unconditionally stale.
    pub async fn handle_node_death(&self, node: &NodeId) -> usize {
        let pids: Vec<u32> = {
            let store = self.store.read().await;
            store
                .workers_for_node(node)
                .iter()
                .map(|record| record.pid)
                .collect()
        };
        tracing::info!(node = %node, workers = pids.len(), "Node death, reclaiming workers");
        // An empty live set stales every record.
        self.handle_heartbeat(node, &[]).await
    }

    /// Event loop: periodic sweeps plus membership events, until cancelled.
    pub async fn run(
        self: Arc<Self>,
        token: CancellationToken,
        mut events: mpsc::Receiver<ClusterEvent>,
    ) {
        let mut ticker = interval(Duration::from_millis(self.sweep_interval_ms));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(_) => {}
                        Err(JobError::LockBusy(_)) => {
                            tracing::trace!("Sweep lock busy, skipping");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Dead job sweep failed");
                        }
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(ClusterEvent::Heartbeat { node, live_pids }) => {
                            self.handle_heartbeat(&node, &live_pids).await;
                        }
                        Some(ClusterEvent::NodeDown { node }) => {
                            self.handle_node_death(&node).await;
                        }
                        None => {
                            tracing::debug!("Cluster event channel closed");
                            break;
                        }
                    }
                }
                _ = token.cancelled() => {
                    tracing::info!("Reconciler shutting down");
                    break;
                }
            }
        }
    }
}
