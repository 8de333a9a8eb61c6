//! The store seam: every broker component talks to the shared
//! key-value store through the [`Store`] trait.
//!
//! Two backends are provided:
//! - [`RedisStore`]: the production backend; the atomic composites run
//!   as server-side Lua scripts so concurrent workers always see a
//!   consistent view.
//! - [`MemoryStore`]: an in-process backend for single-process use and
//!   hermetic tests; a single mutex section per operation gives the
//!   same atomicity the scripts give Redis.

mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Command subset the broker assumes of the shared store.
///
/// The `put_and_*`, `promote_due`, `remove_and_*` operations are atomic
/// composites: no observer may see a partially applied state. Any new
/// backend must honor that, or the broker's invariants (a queued id
/// always has a payload; complete/retry finalize in one step) break
/// under concurrent workers.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // Hash (the job payload index).
    async fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()>;
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;
    async fn hash_del(&self, key: &str, field: &str) -> Result<()>;
    async fn hash_len(&self, key: &str) -> Result<u64>;

    // Lists (ready queue and pending lists). Push lands on the newest
    // end; pops take the oldest end.
    async fn list_push(&self, key: &str, value: &str) -> Result<()>;
    async fn list_len(&self, key: &str) -> Result<u64>;
    /// Atomically move the oldest element of `source` to the newest end
    /// of `dest`, blocking up to `timeout`. `None` on timeout.
    async fn blocking_pop_push(
        &self,
        source: &str,
        dest: &str,
        timeout: Duration,
    ) -> Result<Option<String>>;
    /// Non-blocking variant; `None` when `source` is empty.
    async fn pop_push(&self, source: &str, dest: &str) -> Result<Option<String>>;

    // Sorted set (the delayed set).
    async fn sorted_len(&self, key: &str) -> Result<u64>;
    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>>;

    // Plain keys (worker liveness).
    async fn put_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
    async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// All keys matching a glob pattern. Backends iterate with a cursor
    /// so large namespaces never block the store.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    // Atomic composites.

    /// `hash[id] = payload` and push `id` onto `list`, atomically.
    async fn put_and_push(&self, hash: &str, list: &str, id: &str, payload: &[u8]) -> Result<()>;

    /// `hash[id] = payload` and add `id` to `zset` at `score`, atomically.
    async fn put_and_schedule(
        &self,
        hash: &str,
        zset: &str,
        id: &str,
        payload: &[u8],
        score: f64,
    ) -> Result<()>;

    /// Move every member of `zset` with score <= `max_score` onto the
    /// newest end of `list`, in ascending score order, atomically.
    /// Returns the number moved.
    async fn promote_due(&self, zset: &str, list: &str, max_score: f64) -> Result<u64>;

    /// Remove one occurrence of `id` from `list` and delete `hash[id]`,
    /// atomically. Returns how many list occurrences were removed (0 or
    /// 1); the hash delete happens either way.
    async fn remove_and_delete(&self, list: &str, hash: &str, id: &str) -> Result<u64>;

    /// Remove one occurrence of `id` from `list` and push it onto the
    /// newest end of `dest`, atomically. The removal is a no-op when the
    /// id is absent; the push always happens.
    async fn remove_and_push(&self, list: &str, dest: &str, id: &str) -> Result<()>;
}
