use serde_json::Value;

use crate::error::Result;

/// Serialization seam between caller-supplied job values and the opaque
/// payload bytes the broker stores.
///
/// The broker never inspects a payload after encoding; the only
/// pre-encoding peek is [`Codec::scheduled_at`], which decides whether a
/// submission goes to the ready queue or the delayed set.
pub trait Codec: Send + Sync + 'static {
    fn encode(&self, job: &Value) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// Extract the job's scheduled start time (fractional epoch seconds),
    /// if it has one.
    fn scheduled_at(&self, job: &Value) -> Option<f64>;
}

/// JSON codec. Jobs are arbitrary JSON values; a scheduled job carries a
/// numeric top-level `scheduled_at` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, job: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(job)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn scheduled_at(&self, job: &Value) -> Option<f64> {
        job.get("scheduled_at").and_then(Value::as_f64)
    }
}
