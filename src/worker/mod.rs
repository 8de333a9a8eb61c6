//! Worker-side components of the broker:
//!
//! - [`ProcessingList`]: this worker's in-flight buffer, with job
//!   finalization (complete/retry), the liveness heartbeat, and the
//!   abandoned-job recovery scan
//! - [`Delegate`]: the handler invoked once per fetched job; returning
//!   an error sends the job back for retry

pub mod delegate;
pub mod pending;

pub use delegate::{Delegate, LoggingDelegate};
pub use pending::ProcessingList;
