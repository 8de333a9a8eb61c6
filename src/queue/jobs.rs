use std::sync::Arc;

use crate::error::Result;
use crate::store::Store;

/// Payload index: `{prefix}:jobs`, one hash field per job id.
///
/// An entry is created (atomically with the queue insert) on
/// submission and removed only when the job completes; it survives any
/// number of retries unchanged.
#[derive(Clone)]
pub struct JobStore {
    store: Arc<dyn Store>,
    key: String,
}

impl JobStore {
    pub fn new(store: Arc<dyn Store>, prefix: &str) -> Self {
        Self {
            store,
            key: format!("{prefix}:jobs"),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn put(&self, id: &str, payload: &[u8]) -> Result<()> {
        self.store.hash_set(&self.key, id, payload).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        self.store.hash_get(&self.key, id).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.hash_del(&self.key, id).await
    }

    pub async fn len(&self) -> Result<u64> {
        self.store.hash_len(&self.key).await
    }
}
