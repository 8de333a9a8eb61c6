use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::Result;
use crate::store::Store;

#[derive(Default)]
struct State {
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
    // Front is the newest end (push side), back is the oldest (pop side).
    lists: HashMap<String, VecDeque<String>>,
    sorted: HashMap<String, HashMap<String, f64>>,
    values: HashMap<String, (Vec<u8>, Option<Instant>)>,
}

impl State {
    fn push(&mut self, key: &str, value: String) {
        self.lists.entry(key.to_string()).or_default().push_front(value);
    }

    fn pop_oldest(&mut self, key: &str) -> Option<String> {
        let list = self.lists.get_mut(key)?;
        let value = list.pop_back();
        if list.is_empty() {
            self.lists.remove(key);
        }
        value
    }

    fn remove_one(&mut self, key: &str, value: &str) -> u64 {
        let Some(list) = self.lists.get_mut(key) else {
            return 0;
        };
        // LREM with positive count removes from the newest end first.
        let removed = match list.iter().position(|v| v == value) {
            Some(idx) => {
                list.remove(idx);
                1
            }
            None => 0,
        };
        if list.is_empty() {
            self.lists.remove(key);
        }
        removed
    }

    fn value_alive(&mut self, key: &str) -> Option<Vec<u8>> {
        let expired = match self.values.get(key) {
            Some((_, Some(deadline))) => *deadline <= Instant::now(),
            Some((_, None)) => false,
            None => return None,
        };
        if expired {
            self.values.remove(key);
            return None;
        }
        self.values.get(key).map(|(value, _)| value.clone())
    }
}

/// In-process [`Store`]. Every operation runs under one mutex, which is
/// what makes the composite operations atomic with respect to each
/// other; a `Notify` wakes fetchers blocked on an empty list.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    wakeup: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_vec());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state.lock().unwrap();
        Ok(state.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(hash) = state.hashes.get_mut(key) {
            hash.remove(field);
            if hash.is_empty() {
                state.hashes.remove(key);
            }
        }
        Ok(())
    }

    async fn hash_len(&self, key: &str) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state.hashes.get(key).map_or(0, |h| h.len() as u64))
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        self.state.lock().unwrap().push(key, value.to_string());
        self.wakeup.notify_waiters();
        Ok(())
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state.lists.get(key).map_or(0, |l| l.len() as u64))
    }

    async fn blocking_pop_push(
        &self,
        source: &str,
        dest: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeups before checking, so a push landing
            // between the check and the await is not missed.
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().unwrap();
                if let Some(value) = state.pop_oldest(source) {
                    state.push(dest, value.clone());
                    return Ok(Some(value));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn pop_push(&self, source: &str, dest: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        match state.pop_oldest(source) {
            Some(value) => {
                state.push(dest, value.clone());
                drop(state);
                self.wakeup.notify_waiters();
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn sorted_len(&self, key: &str) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state.sorted.get(key).map_or(0, |z| z.len() as u64))
    }

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let state = self.state.lock().unwrap();
        Ok(state.sorted.get(key).and_then(|z| z.get(member)).copied())
    }

    async fn put_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .values
            .insert(key.to_string(), (value.to_vec(), Some(Instant::now() + ttl)));
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock().unwrap();
        Ok(state.value_alive(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.values.remove(key);
        state.lists.remove(key);
        state.hashes.remove(key);
        state.sorted.remove(key);
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut keys: Vec<String> = state
            .lists
            .keys()
            .chain(state.hashes.keys())
            .chain(state.sorted.keys())
            .chain(state.values.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn put_and_push(&self, hash: &str, list: &str, id: &str, payload: &[u8]) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state
                .hashes
                .entry(hash.to_string())
                .or_default()
                .insert(id.to_string(), payload.to_vec());
            state.push(list, id.to_string());
        }
        self.wakeup.notify_waiters();
        Ok(())
    }

    async fn put_and_schedule(
        &self,
        hash: &str,
        zset: &str,
        id: &str,
        payload: &[u8],
        score: f64,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .hashes
            .entry(hash.to_string())
            .or_default()
            .insert(id.to_string(), payload.to_vec());
        state
            .sorted
            .entry(zset.to_string())
            .or_default()
            .insert(id.to_string(), score);
        Ok(())
    }

    async fn promote_due(&self, zset: &str, list: &str, max_score: f64) -> Result<u64> {
        let promoted = {
            let mut state = self.state.lock().unwrap();
            let mut due: Vec<(String, f64)> = state
                .sorted
                .get(zset)
                .map(|z| {
                    z.iter()
                        .filter(|(_, score)| **score <= max_score)
                        .map(|(id, score)| (id.clone(), *score))
                        .collect()
                })
                .unwrap_or_default();
            due.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

            if let Some(z) = state.sorted.get_mut(zset) {
                for (id, _) in &due {
                    z.remove(id);
                }
                if z.is_empty() {
                    state.sorted.remove(zset);
                }
            }
            for (id, _) in &due {
                state.push(list, id.clone());
            }
            due.len() as u64
        };
        if promoted > 0 {
            self.wakeup.notify_waiters();
        }
        Ok(promoted)
    }

    async fn remove_and_delete(&self, list: &str, hash: &str, id: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let removed = state.remove_one(list, id);
        if let Some(h) = state.hashes.get_mut(hash) {
            h.remove(id);
            if h.is_empty() {
                state.hashes.remove(hash);
            }
        }
        Ok(removed)
    }

    async fn remove_and_push(&self, list: &str, dest: &str, id: &str) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.remove_one(list, id);
            state.push(dest, id.to_string());
        }
        self.wakeup.notify_waiters();
        Ok(())
    }
}

/// Minimal glob matcher covering the patterns the broker uses
/// (`base:*:pending`): `*` matches any run of characters, everything
/// else matches literally.
fn glob_match(pattern: &str, input: &str) -> bool {
    fn inner(p: &[u8], s: &[u8]) -> bool {
        match p.first() {
            None => s.is_empty(),
            Some(b'*') => {
                (0..=s.len()).any(|i| inner(&p[1..], &s[i..]))
            }
            Some(c) => s.first() == Some(c) && inner(&p[1..], &s[1..]),
        }
    }
    inner(pattern.as_bytes(), input.as_bytes())
}
