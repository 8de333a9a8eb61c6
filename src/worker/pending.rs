use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::error::Result;
use crate::queue::jobs::JobStore;
use crate::queue::ready::ReadyQueue;
use crate::store::Store;

/// This worker's in-flight set, plus the cluster's safety net.
///
/// Ids live on `{prefix}:processing:{worker_id}:pending` between fetch
/// and finalization. The sibling liveness key
/// `{prefix}:processing:{worker_id}` is refreshed with a short TTL on
/// every heartbeat; once it lapses, any other worker's recovery scan
/// may drain the pending list back onto the ready queue.
pub struct ProcessingList {
    store: Arc<dyn Store>,
    jobs: JobStore,
    ready: ReadyQueue,
    codec: Arc<dyn Codec>,
    base: String,
    worker_id: String,
    pending_key: String,
    heartbeat_key: String,
    complete_count: AtomicU64,
}

impl ProcessingList {
    pub fn new(
        store: Arc<dyn Store>,
        jobs: JobStore,
        ready: ReadyQueue,
        codec: Arc<dyn Codec>,
        prefix: &str,
        worker_id: &str,
    ) -> Self {
        let base = format!("{prefix}:processing");
        Self {
            pending_key: format!("{base}:{worker_id}:pending"),
            heartbeat_key: format!("{base}:{worker_id}"),
            store,
            jobs,
            ready,
            codec,
            base,
            worker_id: worker_id.to_string(),
            complete_count: AtomicU64::new(0),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn pending_key(&self) -> &str {
        &self.pending_key
    }

    /// Jobs completed by this worker since it started.
    pub fn complete_count(&self) -> u64 {
        self.complete_count.load(Ordering::Relaxed)
    }

    pub async fn size(&self) -> Result<u64> {
        self.store.list_len(&self.pending_key).await
    }

    /// Block until a ready job lands on this worker's pending list.
    /// `None` only on cancellation.
    pub async fn fetch(&self, token: &CancellationToken) -> Result<Option<String>> {
        self.ready
            .blocking_fetch_into(&self.pending_key, token)
            .await
    }

    /// Finalize a job: drop it from the pending list and delete its
    /// payload, atomically. Calling this twice is safe; the second
    /// removal is a no-op. Returns how many pending occurrences were
    /// removed.
    pub async fn complete(&self, id: &str) -> Result<u64> {
        let removed = self
            .store
            .remove_and_delete(&self.pending_key, self.jobs.key(), id)
            .await?;
        self.complete_count.fetch_add(1, Ordering::Relaxed);
        Ok(removed)
    }

    /// Send a job back: drop it from the pending list and append it to
    /// the ready queue, atomically. The payload stays in the job store.
    /// Safe when the id is no longer pending (the removal no-ops).
    pub async fn retry(&self, id: &str) -> Result<()> {
        self.store
            .remove_and_push(&self.pending_key, self.ready.key(), id)
            .await?;
        tracing::warn!("Retrying job: {}", id);
        Ok(())
    }

    /// Drop a job whose payload has gone missing: remove it from the
    /// pending list without re-queueing and without counting a
    /// completion.
    pub async fn discard(&self, id: &str) -> Result<()> {
        self.store
            .remove_and_delete(&self.pending_key, self.jobs.key(), id)
            .await?;
        Ok(())
    }

    /// One heartbeat-and-recovery pass.
    ///
    /// Refreshes this worker's liveness key (TTL = ceil(delay * factor)
    /// seconds, value = encoded uptime blob), then scans the processing
    /// namespace for pending lists whose owner's liveness key has
    /// lapsed and drains them onto the ready queue, one id at a time.
    /// Each per-id move is atomic, so a crash mid-drain loses nothing.
    /// Returns the number of ids recovered.
    pub async fn requeue(&self, start_time: Instant, delay: Duration, factor: f64) -> Result<u64> {
        let uptime = start_time.elapsed().as_secs_f64();
        let ttl = Duration::from_secs((delay.as_secs_f64() * factor).ceil() as u64);
        let blob = self.codec.encode(&json!({ "uptime": uptime }))?;
        self.store
            .put_with_ttl(&self.heartbeat_key, &blob, ttl)
            .await?;

        let pattern = format!("{}:*:pending", self.base);
        let owner_prefix = format!("{}:", self.base);
        let mut recovered = 0u64;
        for key in self.store.scan_keys(&pattern).await? {
            let Some(owner) = key
                .strip_prefix(owner_prefix.as_str())
                .and_then(|rest| rest.strip_suffix(":pending"))
            else {
                continue;
            };
            let liveness_key = format!("{}:{}", self.base, owner);
            if self.store.get_value(&liveness_key).await?.is_some() {
                continue;
            }
            while let Some(id) = self.store.pop_push(&key, self.ready.key()).await? {
                tracing::debug!(job_id = %id, owner = %owner, "Recovered abandoned job");
                recovered += 1;
            }
            self.store.delete(&key).await?;
        }
        Ok(recovered)
    }

    /// Perpetual heartbeat/recovery loop: requeue, warn when anything
    /// was recovered, sleep `delay`, repeat. Runs until the token is
    /// cancelled; a failed pass is logged and retried next round.
    pub async fn run_heartbeat(
        &self,
        start_time: Instant,
        delay: Duration,
        factor: f64,
        token: CancellationToken,
    ) {
        loop {
            match self.requeue(start_time, delay, factor).await {
                Ok(0) => {}
                Ok(count) => {
                    tracing::warn!(count, "Requeued jobs abandoned by dead workers");
                }
                Err(error) => {
                    tracing::error!(error = %error, "Heartbeat pass failed, retrying next round");
                }
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
