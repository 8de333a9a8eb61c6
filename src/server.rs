use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::codec::Codec;
use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::queue::{DelayedSet, JobStore, ReadyQueue};
use crate::store::Store;
use crate::worker::{Delegate, ProcessingList};

/// One worker's view of the broker.
///
/// Composes the four store-backed components, exposes the single
/// submit entry point, and runs the background loops: the delayed-job
/// sweeper, the heartbeat/recovery loop, and the dispatcher that
/// fetches ready jobs and hands them to the delegate.
pub struct Server {
    worker_id: String,
    config: BrokerConfig,
    codec: Arc<dyn Codec>,
    delegate: Arc<dyn Delegate>,
    jobs: JobStore,
    ready: ReadyQueue,
    delayed: DelayedSet,
    processing: Arc<ProcessingList>,
    token: CancellationToken,
    in_flight: Arc<Semaphore>,
    running: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started_at: Instant,
}

/// Point-in-time queue depths for operator inspection.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub worker_id: String,
    pub ready: u64,
    pub delayed: u64,
    pub pending: u64,
    pub completed: u64,
}

impl Server {
    /// Build a server over a shared store handle. Mints a fresh worker
    /// id and derives the component keys from `config.prefix`.
    ///
    /// `parent` is the cancellation scope the background loops run
    /// under; cancelling it stops this server. Pass `None` for a
    /// standalone scope.
    pub fn new(
        delegate: Arc<dyn Delegate>,
        store: Arc<dyn Store>,
        config: BrokerConfig,
        codec: Arc<dyn Codec>,
        parent: Option<CancellationToken>,
    ) -> Result<Arc<Self>> {
        if config.factor < 1.0 {
            return Err(BrokerError::Config(format!(
                "liveness factor must be >= 1, got {}",
                config.factor
            )));
        }
        let worker_id = Uuid::new_v4().to_string();
        let jobs = JobStore::new(store.clone(), &config.prefix);
        let ready = ReadyQueue::new(store.clone(), jobs.clone(), &config.prefix);
        let delayed = DelayedSet::new(store.clone(), jobs.clone(), &config.prefix);
        let processing = Arc::new(ProcessingList::new(
            store,
            jobs.clone(),
            ready.clone(),
            codec.clone(),
            &config.prefix,
            &worker_id,
        ));
        let token = parent
            .map(|parent| parent.child_token())
            .unwrap_or_default();
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight));
        Ok(Arc::new(Self {
            worker_id,
            config,
            codec,
            delegate,
            jobs,
            ready,
            delayed,
            processing,
            token,
            in_flight,
            running: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
            started_at: Instant::now(),
        }))
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn processing(&self) -> &ProcessingList {
        &self.processing
    }

    /// Submit a job. A job whose `scheduled_at` the codec can extract
    /// goes to the delayed set; anything else goes straight to the
    /// ready queue. Returns the freshly minted job id.
    pub async fn submit(&self, job: &Value) -> Result<String> {
        let scheduled_at = self.codec.scheduled_at(job);
        let payload = self.codec.encode(job)?;
        match scheduled_at {
            Some(target_ts) => self.delayed.submit(&payload, target_ts).await,
            None => self.ready.submit(&payload).await,
        }
    }

    /// Start the sweeper, the heartbeat/recovery loop, and the
    /// dispatcher. Calling `start` on an already running server is a
    /// no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(worker_id = %self.worker_id, "Starting broker server");

        let mut handles = self.handles.lock().await;

        let sweeper = {
            let delayed = self.delayed.clone();
            let ready = self.ready.clone();
            let resolution = self.config.resolution;
            let token = self.token.child_token();
            tokio::spawn(async move {
                delayed.run_sweeper(ready, resolution, token).await;
            })
        };
        handles.push(sweeper);

        let heartbeat = {
            let processing = self.processing.clone();
            let started_at = self.started_at;
            let delay = self.config.delay;
            let factor = self.config.factor;
            let token = self.token.child_token();
            tokio::spawn(async move {
                processing
                    .run_heartbeat(started_at, delay, factor, token)
                    .await;
            })
        };
        handles.push(heartbeat);

        let dispatcher = {
            let server = self.clone();
            tokio::spawn(async move {
                server.dispatch_loop().await;
            })
        };
        handles.push(dispatcher);
    }

    /// Cancel the background loops and wait for them to exit. Pending
    /// jobs are deliberately not drained; whichever worker heartbeats
    /// next will recover them once this worker's liveness key lapses.
    pub async fn stop(&self) {
        self.token.cancel();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        tracing::info!(worker_id = %self.worker_id, "Broker server stopped");
    }

    /// Fetch ready jobs and spawn one handler per job, paced by the
    /// in-flight semaphore: the next fetch only happens once a handler
    /// slot is free.
    async fn dispatch_loop(self: Arc<Self>) {
        loop {
            let permit = tokio::select! {
                _ = self.token.cancelled() => break,
                permit = self.in_flight.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let id = match self.processing.fetch(&self.token).await {
                Ok(Some(id)) => id,
                Ok(None) => break,
                Err(error) => {
                    tracing::error!(error = %error, "Fetch failed, backing off");
                    tokio::select! {
                        _ = self.token.cancelled() => break,
                        _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
                    }
                    continue;
                }
            };

            // A cancellation landing after the fetch but before the
            // handler takes ownership would leak the id into our
            // pending list until liveness recovery; push it back now.
            if self.token.is_cancelled() {
                if let Err(error) = self.processing.retry(&id).await {
                    tracing::error!(job_id = %id, error = %error, "Failed to retry fetched job during shutdown");
                }
                break;
            }

            let server = self.clone();
            let handler_token = self.token.child_token();
            tokio::spawn(async move {
                server.handle_job(id, permit, handler_token).await;
            });
        }
    }

    /// Run one fetched job to finalization: complete on success, retry
    /// on delegate error or cancellation, discard if the payload is
    /// gone.
    async fn handle_job(&self, id: String, _permit: OwnedSemaphorePermit, token: CancellationToken) {
        let payload = match self.jobs.get(&id).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::error!(job_id = %id, "Payload missing for fetched job, dropping it");
                if let Err(error) = self.processing.discard(&id).await {
                    tracing::error!(job_id = %id, error = %error, "Failed to discard job");
                }
                return;
            }
            Err(error) => {
                tracing::error!(job_id = %id, error = %error, "Failed to read payload");
                if let Err(error) = self.processing.retry(&id).await {
                    tracing::error!(job_id = %id, error = %error, "Failed to retry job");
                }
                return;
            }
        };

        let job = match self.codec.decode(&payload) {
            Ok(job) => job,
            Err(error) => {
                tracing::error!(job_id = %id, error = %error, "Failed to decode payload");
                if let Err(error) = self.processing.retry(&id).await {
                    tracing::error!(job_id = %id, error = %error, "Failed to retry job");
                }
                return;
            }
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => Err(anyhow::anyhow!("job handler cancelled")),
            outcome = self.delegate.call(job) => outcome,
        };

        match outcome {
            Ok(()) => {
                if let Err(error) = self.processing.complete(&id).await {
                    tracing::error!(job_id = %id, error = %error, "Failed to complete job");
                }
            }
            Err(error) => {
                tracing::error!(job_id = %id, error = %error, "Job handler failed");
                if let Err(error) = self.processing.retry(&id).await {
                    tracing::error!(job_id = %id, error = %error, "Failed to retry job");
                }
            }
        }
    }

    /// Current queue depths. Never fails; unreadable counts render as 0.
    pub async fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            worker_id: self.worker_id.clone(),
            ready: self.ready.len().await.unwrap_or(0),
            delayed: self.delayed.len().await.unwrap_or(0),
            pending: self.processing.size().await.unwrap_or(0),
            completed: self.processing.complete_count(),
        }
    }

    /// One-line status for operator inspection.
    pub async fn status_string(&self) -> String {
        let status = self.status().await;
        format!(
            "ready={} delayed={} pending={} done={}",
            format_count(status.ready),
            format_count(status.delayed),
            format_count(status.pending),
            format_count(status.completed),
        )
    }
}

/// Humanize a count: 1_234 -> "1.23K", 2_000_000 -> "2.00M".
fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.2}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.2}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}
