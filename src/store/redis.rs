use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::store::Store;

// Atomic composites as server-side scripts. Each runs as a single unit
// on the server, so no worker can observe an id on a queue without its
// payload, or a half-finalized completion.

const SUBMIT_SCRIPT: &str = r#"
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('LPUSH', KEYS[2], ARGV[1])
return 1
"#;

const SCHEDULE_SCRIPT: &str = r#"
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
return 1
"#;

// LPUSH of the ascending-score batch leaves the earliest target time
// closest to the pop end, so consumers drain promoted jobs in order.
const PROMOTE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], 0, ARGV[1])
if #due > 0 then
  redis.call('ZREMRANGEBYSCORE', KEYS[1], 0, ARGV[1])
  redis.call('LPUSH', KEYS[2], unpack(due))
end
return #due
"#;

const COMPLETE_SCRIPT: &str = r#"
local removed = redis.call('LREM', KEYS[1], 1, ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
return removed
"#;

const RETRY_SCRIPT: &str = r#"
redis.call('LREM', KEYS[1], 1, ARGV[1])
redis.call('LPUSH', KEYS[2], ARGV[1])
return 1
"#;

/// Production [`Store`] backed by Redis.
///
/// Normal commands share a managed connection that reconnects on
/// transport failure. Blocking pops run on a dedicated connection so
/// they never stall unrelated commands. The scripts are held per
/// instance; `invoke_async` re-loads them transparently if the server
/// has forgotten a SHA.
pub struct RedisStore {
    conn: ConnectionManager,
    blocking_conn: Mutex<ConnectionManager>,
    submit: Script,
    schedule: Script,
    promote: Script,
    complete: Script,
    retry: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        let blocking_conn = Mutex::new(client.get_connection_manager().await?);
        Ok(Self {
            conn,
            blocking_conn,
            submit: Script::new(SUBMIT_SCRIPT),
            schedule: Script::new(SCHEDULE_SCRIPT),
            promote: Script::new(PROMOTE_SCRIPT),
            complete: Script::new(COMPLETE_SCRIPT),
            retry: Script::new(RETRY_SCRIPT),
        })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("HDEL")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn hash_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("HLEN").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn blocking_pop_push(
        &self,
        source: &str,
        dest: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let mut conn = self.blocking_conn.lock().await;
        let value: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(source)
            .arg(dest)
            .arg(timeout.as_secs_f64())
            .query_async(&mut *conn)
            .await?;
        Ok(value)
    }

    async fn pop_push(&self, source: &str, dest: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("RPOPLPUSH")
            .arg(source)
            .arg(dest)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn sorted_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("ZCARD").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn sorted_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let mut conn = self.conn.clone();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(score)
    }

    async fn put_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    async fn put_and_push(&self, hash: &str, list: &str, id: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = self
            .submit
            .key(hash)
            .key(list)
            .arg(id)
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;
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
        let mut conn = self.conn.clone();
        let _: () = self
            .schedule
            .key(hash)
            .key(zset)
            .arg(id)
            .arg(payload)
            .arg(score)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn promote_due(&self, zset: &str, list: &str, max_score: f64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .promote
            .key(zset)
            .key(list)
            .arg(max_score)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn remove_and_delete(&self, list: &str, hash: &str, id: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .complete
            .key(list)
            .key(hash)
            .arg(id)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn remove_and_push(&self, list: &str, dest: &str, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = self
            .retry
            .key(list)
            .key(dest)
            .arg(id)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
