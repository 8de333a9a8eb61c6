//! End-to-end broker scenarios: a running server dispatching real
//! submissions through a recording delegate over the in-memory store.

mod test_harness;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use conveyor::{epoch_seconds, JobStore, MemoryStore, Store};
use test_harness::{assert_eventually, build_server, test_config, RecordingDelegate};

#[tokio::test]
async fn test_immediate_dispatch_completes_once() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let delegate = RecordingDelegate::new();
    let server = build_server(store, delegate.clone(), test_config("t"));
    server.start().await;

    server.submit(&json!({"data": "x"})).await.unwrap();

    assert_eventually(
        || async { server.processing().complete_count() == 1 },
        Duration::from_secs(3),
        "The submitted job should complete",
    )
    .await;

    assert_eq!(delegate.calls(), vec![json!({"data": "x"})]);
    let status = server.status().await;
    assert_eq!(status.ready, 0);
    assert_eq!(status.pending, 0);
    assert_eq!(status.completed, 1);

    server.stop().await;
}

#[tokio::test]
async fn test_delayed_dispatch_waits_for_its_time() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let delegate = RecordingDelegate::new();
    let server = build_server(store, delegate.clone(), test_config("t"));
    server.start().await;

    server
        .submit(&json!({"data": "y", "scheduled_at": epoch_seconds() + 0.5}))
        .await
        .unwrap();

    // Not yet due: held in the delayed set, not on the ready queue.
    let status = server.status().await;
    assert_eq!(status.delayed, 1);
    assert_eq!(status.ready, 0);
    assert_eq!(delegate.call_count(), 0);

    assert_eventually(
        || async { server.processing().complete_count() == 1 },
        Duration::from_secs(3),
        "The delayed job should run once its time arrives",
    )
    .await;

    let observed = &delegate.calls()[0];
    assert_eq!(observed.get("data"), Some(&json!("y")));

    server.stop().await;
}

#[tokio::test]
async fn test_failed_job_is_retried_until_success() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let delegate = RecordingDelegate::failing(1);
    let server = build_server(store.clone(), delegate.clone(), test_config("t"));
    server.start().await;

    server.submit(&json!({"data": "flaky"})).await.unwrap();

    assert_eventually(
        || async { server.processing().complete_count() == 1 },
        Duration::from_secs(3),
        "The job should complete on its second attempt",
    )
    .await;

    // Same payload observed on both attempts.
    let calls = delegate.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], calls[1]);

    // The payload index is clean after completion.
    let jobs = JobStore::new(store, "t");
    assert_eq!(jobs.len().await.unwrap(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_abandoned_jobs_are_recovered_and_run() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    // A dead worker left one fetched job behind: payload indexed, id in
    // its pending list, no liveness key.
    let jobs = JobStore::new(store.clone(), "t");
    jobs.put("orphan", &serde_json::to_vec(&json!({"data": "lost"})).unwrap())
        .await
        .unwrap();
    store
        .list_push("t:processing:DEAD:pending", "orphan")
        .await
        .unwrap();

    let delegate = RecordingDelegate::new();
    let server = build_server(store.clone(), delegate.clone(), test_config("t"));
    server.start().await;

    assert_eventually(
        || async { server.processing().complete_count() == 1 },
        Duration::from_secs(3),
        "The orphaned job should be recovered and completed",
    )
    .await;

    assert_eq!(delegate.calls(), vec![json!({"data": "lost"})]);
    assert_eq!(store.list_len("t:processing:DEAD:pending").await.unwrap(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let delegate = RecordingDelegate::new();
    let server = build_server(store, delegate.clone(), test_config("t"));

    server.start().await;
    server.start().await;

    server.submit(&json!({"data": "once"})).await.unwrap();

    assert_eventually(
        || async { server.processing().complete_count() == 1 },
        Duration::from_secs(3),
        "The job should complete exactly once",
    )
    .await;

    // A second dispatcher would have delivered the job twice.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(delegate.call_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_missing_payload_is_dropped_not_retried() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    // An id on the ready queue with no payload behind it.
    store.list_push("t:ready", "phantom").await.unwrap();

    let delegate = RecordingDelegate::new();
    let server = build_server(store.clone(), delegate.clone(), test_config("t"));
    server.start().await;

    assert_eventually(
        || async {
            let status = server.status().await;
            status.ready == 0 && status.pending == 0
        },
        Duration::from_secs(3),
        "The phantom id should be discarded",
    )
    .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(delegate.call_count(), 0);
    assert_eq!(server.processing().complete_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_status_string_renders_counts() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let delegate = RecordingDelegate::new();
    let server = build_server(store, delegate, test_config("t"));

    assert_eq!(
        server.status_string().await,
        "ready=0 delayed=0 pending=0 done=0"
    );

    server.submit(&json!({"data": "a"})).await.unwrap();
    server
        .submit(&json!({"data": "b", "scheduled_at": epoch_seconds() + 60.0}))
        .await
        .unwrap();

    assert_eq!(
        server.status_string().await,
        "ready=1 delayed=1 pending=0 done=0"
    );
}
