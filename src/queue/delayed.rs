use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::queue::jobs::JobStore;
use crate::queue::ready::ReadyQueue;
use crate::store::Store;

/// Current wall-clock time as fractional seconds since the epoch, the
/// unit used for delayed-set scores.
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Time-keyed set of scheduled jobs: `{prefix}:delayed`, scored by
/// target timestamp. Jobs sit here until the sweeper promotes them
/// into the ready queue.
#[derive(Clone)]
pub struct DelayedSet {
    store: Arc<dyn Store>,
    jobs: JobStore,
    key: String,
}

impl DelayedSet {
    pub fn new(store: Arc<dyn Store>, jobs: JobStore, prefix: &str) -> Self {
        Self {
            store,
            jobs,
            key: format!("{prefix}:delayed"),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store the payload under a fresh id and schedule the id for
    /// `target_ts`, as one atomic unit.
    pub async fn submit(&self, payload: &[u8], target_ts: f64) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.store
            .put_and_schedule(self.jobs.key(), &self.key, &id, payload, target_ts)
            .await?;
        Ok(id)
    }

    /// Atomically move every id due at `now_ts` onto the ready queue,
    /// in ascending target-time order. Returns the number promoted;
    /// promoting nothing performs no writes.
    pub async fn promote_due(&self, ready: &ReadyQueue, now_ts: f64) -> Result<u64> {
        self.store.promote_due(&self.key, ready.key(), now_ts).await
    }

    /// Perpetual sweeper: every `resolution`, promote whatever has
    /// matured. Runs until the token is cancelled.
    pub async fn run_sweeper(
        &self,
        ready: ReadyQueue,
        resolution: Duration,
        token: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(resolution);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    match self.promote_due(&ready, epoch_seconds()).await {
                        Ok(0) => {}
                        Ok(count) => {
                            tracing::debug!(count, "Promoted due jobs to the ready queue");
                        }
                        Err(error) => {
                            tracing::error!(error = %error, "Sweep failed, retrying next tick");
                        }
                    }
                }
            }
        }
    }

    pub async fn len(&self) -> Result<u64> {
        self.store.sorted_len(&self.key).await
    }

    /// Scheduled target time of an id still waiting, if any.
    pub async fn score(&self, id: &str) -> Result<Option<f64>> {
        self.store.sorted_score(&self.key, id).await
    }
}
