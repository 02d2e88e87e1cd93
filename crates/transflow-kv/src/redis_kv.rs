use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use transflow_core::{Result, TransflowError};

use crate::store::{KvStore, WatchedTx};

fn kv_err(e: redis::RedisError) -> TransflowError {
    tracing::error!(error = %e, "redis command failed");
    TransflowError::Unavailable(Box::new(e))
}

fn pool_err(e: deadpool_redis::PoolError) -> TransflowError {
    tracing::error!(error = %e, "redis connection pool exhausted or unavailable");
    TransflowError::Unavailable(Box::new(e))
}

/// Lua script for the compare-and-delete that backs `delete_if_equal` and
/// `MultiKeyLock::release`: deleting a lock key must check the holder's
/// token server-side in one round trip, never client-side GET-then-DEL, or
/// a released-then-reacquired-by-someone-else key could be deleted out
/// from under its new owner.
const DELETE_IF_EQUAL_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// The production `KvStore` backend: a Redis (or Redis-compatible) server
/// reached through a pooled connection manager. `set_if_absent` maps to
/// `SET key value NX PX ttl_ms`, `delete_if_equal` to the Lua script above
/// run via `EVAL`, and `begin_watch`/`WatchedTx::commit` to `WATCH` +
/// queued commands + `MULTI`/`EXEC`.
pub struct RedisKv {
    pool: Pool,
}

impl RedisKv {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.pool.get().await.map_err(pool_err)?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(kv_err)?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await.map_err(pool_err)?;
        conn.get(key).await.map_err(kv_err)
    }

    async fn delete_if_equal(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.pool.get().await.map_err(pool_err)?;
        let deleted: i64 = redis::Script::new(DELETE_IF_EQUAL_SCRIPT)
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(kv_err)?;
        Ok(deleted == 1)
    }

    async fn hget_multi(&self, key: &str, fields: &[&str]) -> Result<HashMap<String, String>> {
        if fields.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.pool.get().await.map_err(pool_err)?;
        let values: Vec<Option<String>> = conn.hget(key, fields).await.map_err(kv_err)?;
        Ok(fields
            .iter()
            .zip(values)
            .filter_map(|(field, value)| value.map(|v| (field.to_string(), v)))
            .collect())
    }

    async fn begin_watch(&self, watched_keys: &[String]) -> Result<Box<dyn WatchedTx>> {
        let mut conn = self.pool.get().await.map_err(pool_err)?;
        if !watched_keys.is_empty() {
            redis::cmd("WATCH")
                .arg(watched_keys)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(kv_err)?;
        }
        Ok(Box::new(RedisWatchedTx {
            conn,
            staged: Vec::new(),
            finished: false,
        }))
    }
}

enum StagedOp {
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    HSet {
        key: String,
        field: String,
        value: String,
    },
}

struct RedisWatchedTx {
    conn: deadpool_redis::Connection,
    staged: Vec<StagedOp>,
    finished: bool,
}

/// If a caller drops a `RedisWatchedTx` without calling `commit`/`discard`
/// (an early return via `?` on a mid-transaction error, say), the `WATCH`
/// issued by `begin_watch` is never cleared. `Drop` cannot run the `UNWATCH`
/// itself — the same constraint `LockGuard` documents — so this only warns;
/// the dangling watch is cleared the moment this pooled connection next
/// runs any `MULTI`/`EXEC` (Redis clears all watches on a connection at
/// that point, not just the transaction's own), at worst costing an
/// unrelated caller one spurious optimistic-abort retry in the meantime.
impl Drop for RedisWatchedTx {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("watched transaction dropped without commit or discard; relying on the connection's next MULTI/EXEC to clear the WATCH");
        }
    }
}

#[async_trait]
impl WatchedTx for RedisWatchedTx {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.conn.get(key).await.map_err(kv_err)
    }

    async fn hget_multi(&mut self, key: &str, fields: &[&str]) -> Result<HashMap<String, String>> {
        if fields.is_empty() {
            return Ok(HashMap::new());
        }
        let values: Vec<Option<String>> = self.conn.hget(key, fields).await.map_err(kv_err)?;
        Ok(fields
            .iter()
            .zip(values)
            .filter_map(|(field, value)| value.map(|v| (field.to_string(), v)))
            .collect())
    }

    fn queue_set(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        self.staged.push(StagedOp::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        });
    }

    fn queue_hset(&mut self, key: &str, field: &str, value: &str) {
        self.staged.push(StagedOp::HSet {
            key: key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    async fn commit(mut self: Box<Self>) -> Result<bool> {
        if self.staged.is_empty() {
            redis::cmd("UNWATCH")
                .query_async::<_, ()>(&mut self.conn)
                .await
                .map_err(kv_err)?;
            self.finished = true;
            return Ok(true);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &self.staged {
            match op {
                StagedOp::Set { key, value, ttl } => match ttl {
                    Some(ttl) => {
                        pipe.cmd("SET").arg(key).arg(value).arg("PX").arg(ttl.as_millis() as u64);
                    }
                    None => {
                        pipe.cmd("SET").arg(key).arg(value);
                    }
                },
                StagedOp::HSet { key, field, value } => {
                    pipe.cmd("HSET").arg(key).arg(field).arg(value);
                }
            }
        }

        // `query_async` on an atomic pipeline returns `Ok(None)`-shaped data
        // only through a dedicated type; the `redis` crate surfaces an
        // aborted MULTI/EXEC as a nil bulk reply, which deserializes into
        // `None` here.
        let result: Option<Vec<redis::Value>> =
            pipe.query_async(&mut self.conn).await.map_err(kv_err)?;
        self.finished = true;
        Ok(result.is_some())
    }

    async fn discard(mut self: Box<Self>) -> Result<()> {
        redis::cmd("UNWATCH")
            .query_async::<_, ()>(&mut self.conn)
            .await
            .map_err(kv_err)?;
        self.finished = true;
        Ok(())
    }
}
