mod harness;

use serde_json::json;

use harness::TestCluster;
use jobmill::cluster::NodeId;
use jobmill::error::JobError;
use jobmill::queue::JobState;
use jobmill::worker::WorkerOutcome;

#[tokio::test]
async fn scenario_job_failure_and_operator_requeue() {
    let mut cluster = TestCluster::new().await;

    let item = cluster
        .push("ocr", "boom", json!({ "document_id": 5 }))
        .await
        .unwrap();
    cluster.dispatcher.tick().await.unwrap().unwrap();

    let exit = cluster.wait_exit().await;
    match exit.outcome {
        WorkerOutcome::Failed(reason) => assert!(reason.contains("bad pdf")),
        other => panic!("unexpected outcome {other:?}"),
    }

    // Error state with the failure detail, worker record gone.
    {
        let store = cluster.store.read().await;
        let failed = store.item(item.id).unwrap();
        assert_eq!(failed.state, JobState::Error);
        assert!(failed.result.as_deref().unwrap().contains("bad pdf"));
        assert_eq!(store.worker_count(&cluster.node), 0);
    }

    // Operator requeue sends it to the back of the queue.
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    cluster
        .store
        .write()
        .await
        .requeue(item.id, false, false)
        .unwrap();
    let store = cluster.store.read().await;
    let requeued = store.item(item.id).unwrap();
    assert_eq!(requeued.state, JobState::Pending);
    assert!(requeued.created_at > item.created_at);
}

#[tokio::test]
async fn panicking_job_is_isolated() {
    let mut cluster = TestCluster::new().await;

    let item = cluster
        .push("ocr", "panicky", json!({ "document_id": 1 }))
        .await
        .unwrap();
    cluster.dispatcher.tick().await.unwrap().unwrap();

    let exit = cluster.wait_exit().await;
    match exit.outcome {
        WorkerOutcome::Failed(reason) => {
            assert!(reason.contains("panic"));
            assert!(reason.contains("kaboom"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(cluster.item_state(item.id).await, Some(JobState::Error));
    assert_eq!(cluster.worker_count().await, 0);

    // The dispatcher survives and keeps dispatching.
    let next = cluster
        .push("ocr", "ocr_run", json!({ "document_id": 2 }))
        .await
        .unwrap();
    cluster.dispatcher.tick().await.unwrap().unwrap();
    let exit = cluster.wait_exit().await;
    assert_eq!(exit.item_id, next.id);
    assert_eq!(exit.outcome, WorkerOutcome::Completed);
}

#[tokio::test]
async fn terminate_is_local_node_only() {
    let cluster = TestCluster::new().await;
    let elsewhere = NodeId::new("node-2");
    assert!(matches!(
        cluster.pool.terminate(&elsewhere, 1),
        Err(JobError::NotLocalWorker { .. })
    ));
}

#[tokio::test]
async fn terminate_of_finished_worker_is_ok() {
    let cluster = TestCluster::new().await;
    // Never spawned, same as already exited.
    assert!(cluster.pool.terminate(&cluster.node, 42).is_ok());
}

#[tokio::test]
async fn terminated_worker_is_recovered_by_reconciler() {
    let mut cluster = TestCluster::new().await;

    let item = cluster
        .push("ocr", "gated", json!({ "document_id": 5 }))
        .await
        .unwrap();
    cluster.dispatcher.tick().await.unwrap().unwrap();
    cluster.wait_worker_count(1).await;

    let pid = {
        let store = cluster.store.read().await;
        store.workers_for_node(&cluster.node)[0].pid
    };
    cluster.pool.terminate(&cluster.node, pid).unwrap();

    let exit = cluster.wait_exit().await;
    assert_eq!(exit.outcome, WorkerOutcome::Killed);

    // A kill leaves the item Processing and the record in place, exactly
    // like a crashed process. The pid is gone from the live set though.
    assert_eq!(cluster.item_state(item.id).await, Some(JobState::Processing));
    assert_eq!(cluster.worker_count().await, 1);
    assert!(!cluster.pool.live_pids().contains(&pid));

    // The next heartbeat repairs it: front of the queue, original timestamp.
    let live = cluster.pool.live_pids();
    let repaired = cluster.reconciler.handle_heartbeat(&cluster.node, &live).await;
    assert_eq!(repaired, 1);

    let store = cluster.store.read().await;
    let recovered = store.item(item.id).unwrap();
    assert_eq!(recovered.state, JobState::Pending);
    assert_eq!(recovered.created_at, item.created_at);
    assert_eq!(store.worker_count(&cluster.node), 0);
}

#[tokio::test]
async fn gated_job_completes_after_release() {
    let mut cluster = TestCluster::new().await;

    let item = cluster
        .push("ocr", "gated", json!({ "document_id": 1 }))
        .await
        .unwrap();
    cluster.dispatcher.tick().await.unwrap().unwrap();
    assert_eq!(cluster.item_state(item.id).await, Some(JobState::Processing));

    cluster.gate.add_permits(1);
    let exit = cluster.wait_exit().await;
    assert_eq!(exit.outcome, WorkerOutcome::Completed);
    assert!(cluster.item_state(item.id).await.is_none());
    assert_eq!(cluster.worker_count().await, 0);
}
