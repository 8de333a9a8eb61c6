//! Shared helpers for broker integration tests.
//!
//! Tests run hermetically against [`MemoryStore`]; its mutex sections
//! give the same atomicity the Lua scripts give Redis, so the broker
//! protocol under test is the same.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use conveyor::{
    BrokerConfig, Delegate, DelayedSet, JobStore, JsonCodec, MemoryStore, ProcessingList,
    ReadyQueue, Server, Store,
};

/// Broker config with short timings for fast tests.
pub fn test_config(prefix: &str) -> BrokerConfig {
    BrokerConfig::new(prefix)
        .with_resolution(Duration::from_millis(100))
        .with_delay(Duration::from_millis(100))
        .with_factor(2.0)
        .with_max_in_flight(8)
}

/// A fresh in-memory store plus the queue-side components derived from
/// `prefix`, for tests that drive components directly.
pub fn components(prefix: &str) -> (Arc<dyn Store>, JobStore, ReadyQueue, DelayedSet) {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let jobs = JobStore::new(store.clone(), prefix);
    let ready = ReadyQueue::new(store.clone(), jobs.clone(), prefix);
    let delayed = DelayedSet::new(store.clone(), jobs.clone(), prefix);
    (store, jobs, ready, delayed)
}

/// A processing list for `worker_id` over the same store/prefix.
pub fn processing_list(
    store: Arc<dyn Store>,
    prefix: &str,
    worker_id: &str,
) -> ProcessingList {
    let jobs = JobStore::new(store.clone(), prefix);
    let ready = ReadyQueue::new(store.clone(), jobs.clone(), prefix);
    ProcessingList::new(store, jobs, ready, Arc::new(JsonCodec), prefix, worker_id)
}

/// Build a server over an existing store so tests can pre-seed or
/// inspect keys around it.
pub fn build_server(
    store: Arc<dyn Store>,
    delegate: Arc<dyn Delegate>,
    config: BrokerConfig,
) -> Arc<Server> {
    Server::new(delegate, store, config, Arc::new(JsonCodec), None)
        .expect("server construction should succeed")
}

/// Delegate that records every job it sees and fails the first N calls.
pub struct RecordingDelegate {
    calls: Mutex<Vec<Value>>,
    failures_remaining: AtomicU32,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Self::failing(0)
    }

    /// Fail the first `failures` calls, then succeed.
    pub fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failures_remaining: AtomicU32::new(failures),
        })
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Delegate for RecordingDelegate {
    async fn call(&self, job: Value) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(job);
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            anyhow::bail!("induced delegate failure");
        }
        Ok(())
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}

pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(20)).await;
    assert!(result, "{}", message);
}
