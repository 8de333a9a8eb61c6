//! `conveyor` is a distributed job broker: worker processes coordinate
//! through a shared key-value store to deliver every submitted job at
//! least once to a delegate, promote scheduled jobs when their time
//! arrives, and recover in-flight jobs from crashed workers.
//!
//! The moving parts, all keyed under a common prefix in the store:
//!
//! - [`queue::JobStore`]: payload index by job id
//! - [`queue::ReadyQueue`]: FIFO of ids eligible to run now
//! - [`queue::DelayedSet`]: ids scheduled for a future time, promoted
//!   by a background sweeper
//! - [`worker::ProcessingList`]: per-worker in-flight list with a
//!   liveness heartbeat and an abandoned-job recovery scan
//! - [`server::Server`]: composes the above, dispatches fetched jobs
//!   to a [`worker::Delegate`], and owns the background loops
//!
//! Delivery is at-least-once; delegates must be idempotent.

pub mod codec;
pub mod config;
pub mod error;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod status;
pub mod store;
pub mod worker;

pub use codec::{Codec, JsonCodec};
pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use queue::{epoch_seconds, DelayedSet, JobStore, ReadyQueue};
pub use server::{Server, StatusSnapshot};
pub use store::{MemoryStore, RedisStore, Store};
pub use worker::{Delegate, LoggingDelegate, ProcessingList};
