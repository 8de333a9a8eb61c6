//! Queue-side components of the broker:
//!
//! - [`JobStore`]: payload index, one hash field per job id
//! - [`ReadyQueue`]: FIFO of ids eligible to run right now
//! - [`DelayedSet`]: time-keyed ids awaiting their scheduled start,
//!   with the sweeper loop that promotes them when due

pub mod delayed;
pub mod jobs;
pub mod ready;

pub use delayed::{epoch_seconds, DelayedSet};
pub use jobs::JobStore;
pub use ready::ReadyQueue;
