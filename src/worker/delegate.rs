use async_trait::async_trait;
use serde_json::Value;

/// Handler invoked once per fetched job.
///
/// Returning `Ok` completes the job; returning an error sends it back
/// to the ready queue for another attempt. Delivery is at-least-once,
/// so implementations must be idempotent.
#[async_trait]
pub trait Delegate: Send + Sync + 'static {
    async fn call(&self, job: Value) -> anyhow::Result<()>;
}

/// Delegate that logs each job it receives. Useful for smoke-testing a
/// worker deployment before wiring in a real handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDelegate;

#[async_trait]
impl Delegate for LoggingDelegate {
    async fn call(&self, job: Value) -> anyhow::Result<()> {
        tracing::info!(job = %job, "Received job");
        Ok(())
    }
}
