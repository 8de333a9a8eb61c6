use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::queue::jobs::JobStore;
use crate::store::Store;

/// How long each blocking pop round waits before re-checking for
/// cancellation.
const FETCH_POLL: Duration = Duration::from_secs(1);

/// FIFO of job ids eligible for immediate execution: the rendezvous
/// between producers (submit, sweeper, recovery, retry) and the
/// dispatcher.
///
/// Pushes land on the newest end; pops take the oldest. Retried and
/// recovered ids use the same end as new work, so they line up behind
/// it rather than starving it.
#[derive(Clone)]
pub struct ReadyQueue {
    store: Arc<dyn Store>,
    jobs: JobStore,
    key: String,
}

impl ReadyQueue {
    pub fn new(store: Arc<dyn Store>, jobs: JobStore, prefix: &str) -> Self {
        Self {
            store,
            jobs,
            key: format!("{prefix}:ready"),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store the payload under a fresh id and append the id to the
    /// queue, as one atomic unit: no observer sees the id without its
    /// payload.
    pub async fn submit(&self, payload: &[u8]) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.store
            .put_and_push(self.jobs.key(), &self.key, &id, payload)
            .await?;
        Ok(id)
    }

    /// Block until an id can be moved from the oldest end of the queue
    /// onto `pending_key`, or the token is cancelled. Returns `None`
    /// only on cancellation.
    ///
    /// The store's blocking pop is polled with short timeouts so
    /// cancellation is observed promptly even while the queue is empty.
    pub async fn blocking_fetch_into(
        &self,
        pending_key: &str,
        token: &CancellationToken,
    ) -> Result<Option<String>> {
        loop {
            if token.is_cancelled() {
                return Ok(None);
            }
            tokio::select! {
                _ = token.cancelled() => return Ok(None),
                popped = self.store.blocking_pop_push(&self.key, pending_key, FETCH_POLL) => {
                    if let Some(id) = popped? {
                        return Ok(Some(id));
                    }
                }
            }
        }
    }

    /// Append an id to the newest end (retry and recovery path).
    pub async fn push(&self, id: &str) -> Result<()> {
        self.store.list_push(&self.key, id).await
    }

    pub async fn len(&self) -> Result<u64> {
        self.store.list_len(&self.key).await
    }
}
