#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use jobmill::cluster::{NodeId, StaticResources};
use jobmill::config::SchedulerConfig;
use jobmill::dispatcher::Dispatcher;
use jobmill::error::JobError;
use jobmill::lock::LocalLockService;
use jobmill::queue::store::SharedStore;
use jobmill::queue::{JobQueueItem, JobState, JobStore};
use jobmill::reconciler::Reconciler;
use jobmill::registry::Registry;
use jobmill::worker::{WorkerExit, WorkerPool};

#[derive(Deserialize)]
pub struct OcrArgs {
    pub document_id: u64,
}

/// Registry used across the suites: one instant job type, one that blocks
/// on a semaphore permit, one that fails, one that panics; an "ocr" dedup
/// queue, a low-priority "bulk" dedup queue, and a non-dedup "shared" queue.
pub fn build_registry(gate: Arc<Semaphore>) -> Registry {
    Registry::builder()
        .job_type("ocr_run", "OCR run", |_: OcrArgs| async { Ok(()) })
        .unwrap()
        .job_type("gated", "Gated", move |_: OcrArgs| {
            let gate = gate.clone();
            async move {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| JobError::JobFailed(e.to_string()))?;
                permit.forget();
                Ok(())
            }
        })
        .unwrap()
        .job_type("boom", "Boom", |_: OcrArgs| async {
            Err(JobError::JobFailed("bad pdf".to_string()))
        })
        .unwrap()
        .job_type("panicky", "Panicky", |_: OcrArgs| async { panic!("kaboom") })
        .unwrap()
        .queue("ocr", "OCR queue", 1, true)
        .unwrap()
        .queue("bulk", "Bulk queue", 9, true)
        .unwrap()
        .queue("shared", "Shared queue", 5, false)
        .unwrap()
        .build()
}

pub struct TestCluster {
    pub node: NodeId,
    pub store: SharedStore,
    pub registry: Arc<Registry>,
    pub locks: Arc<LocalLockService>,
    pub pool: Arc<WorkerPool>,
    pub dispatcher: Arc<Dispatcher>,
    pub reconciler: Arc<Reconciler>,
    pub exits: mpsc::UnboundedReceiver<WorkerExit>,
    pub gate: Arc<Semaphore>,
}

impl TestCluster {
    pub async fn new() -> Self {
        Self::with_resources(StaticResources::idle(), 4).await
    }

    pub async fn with_resources(resources: StaticResources, max_workers: usize) -> Self {
        let gate = Arc::new(Semaphore::new(0));
        let registry = Arc::new(build_registry(gate.clone()));

        let store = JobStore::shared();
        store.write().await.register_queues(&registry);

        let node = NodeId::new("node-1");
        let locks = Arc::new(LocalLockService::new());
        let config = SchedulerConfig::new(50, 1_000).with_max_workers(max_workers);

        let pool = WorkerPool::new(node.clone(), store.clone(), registry.clone());
        let exits = pool.exit_notifications();
        let dispatcher = Dispatcher::new(
            node.clone(),
            store.clone(),
            pool.clone(),
            locks.clone(),
            Arc::new(resources),
            config.clone(),
        );
        let reconciler = Reconciler::new(store.clone(), locks.clone(), config.sweep_interval_ms);

        Self {
            node,
            store,
            registry,
            locks,
            pool,
            dispatcher,
            reconciler,
            exits,
            gate,
        }
    }

    pub async fn push(
        &self,
        queue: &str,
        job_type: &str,
        kwargs: serde_json::Value,
    ) -> jobmill::Result<JobQueueItem> {
        self.store
            .write()
            .await
            .push(&self.registry, queue, job_type, kwargs)
    }

    pub async fn item_state(&self, id: Uuid) -> Option<JobState> {
        self.store.read().await.item(id).ok().map(|item| item.state)
    }

    pub async fn worker_count(&self) -> usize {
        self.store.read().await.worker_count(&self.node)
    }

    /// Poll until this node has exactly `count` worker records.
    pub async fn wait_worker_count(&self, count: usize) {
        for _ in 0..100 {
            if self.worker_count().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("worker count never reached {count}");
    }

    /// Wait for the next worker exit, failing the test after five seconds.
    pub async fn wait_exit(&mut self) -> WorkerExit {
        tokio::time::timeout(Duration::from_secs(5), self.exits.recv())
            .await
            .expect("timed out waiting for a worker exit")
            .expect("exit channel closed")
    }
}
