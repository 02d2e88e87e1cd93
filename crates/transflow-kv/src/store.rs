use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use transflow_core::Result;

/// The six-operation capability boundary the engine needs from a shared
/// key-value store. This is the engine's one dynamic-dispatch seam — any
/// backend offering these operations may be substituted, which is exactly
/// how `InMemoryKv` stands in for `RedisKv` in every test in
/// `transflow-lock` and `transflow-engine`.
///
/// A watched transaction is naturally a closure that both reads and
/// enqueues writes, but Rust has no stable object-safe way to accept a
/// generic async closure on a `dyn`-dispatched trait, so the same shape is
/// expressed as a transaction handle instead: `begin_watch` returns a
/// `WatchedTx` the caller reads from and queues writes on, and
/// `WatchedTx::commit` is the `EXEC` that succeeds iff nothing watched
/// changed. The semantics — WATCH, then optimistic MULTI/EXEC — are
/// unchanged; only the calling convention is more idiomatic.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomically write `key = value` only if `key` is currently absent.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Read a plain string key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Atomic compare-and-delete: remove `key` iff its current value equals
    /// `value`. Must be a single server-side operation, never a
    /// client-side read-then-delete.
    async fn delete_if_equal(&self, key: &str, value: &str) -> Result<bool>;

    /// Read several hash fields of `key` at once. Fields absent from the
    /// hash (or if the hash itself doesn't exist) are simply absent from
    /// the returned map.
    async fn hget_multi(&self, key: &str, fields: &[&str]) -> Result<HashMap<String, String>>;

    /// Begin a watched transaction over `watched_keys`. The returned
    /// handle is read from and queued against until `WatchedTx::commit`
    /// is called; commit aborts (returns `Ok(false)`) iff any watched key
    /// changed since this call.
    async fn begin_watch(&self, watched_keys: &[String]) -> Result<Box<dyn WatchedTx>>;
}

/// A single watched, optimistic transaction in flight.
#[async_trait]
pub trait WatchedTx: Send {
    /// Read a plain string key through this transaction's connection.
    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// Read several hash fields through this transaction's connection.
    async fn hget_multi(&mut self, key: &str, fields: &[&str]) -> Result<HashMap<String, String>>;

    /// Queue a plain-string write to take effect only if `commit` succeeds.
    fn queue_set(&mut self, key: &str, value: &str, ttl: Option<Duration>);

    /// Queue a single hash-field write to take effect only if `commit`
    /// succeeds.
    fn queue_hset(&mut self, key: &str, field: &str, value: &str);

    /// Attempt to commit every queued write atomically. Returns `Ok(true)`
    /// on success, `Ok(false)` if the transaction aborted because a
    /// watched key changed since `begin_watch` — the caller's retry
    /// candidate case.
    async fn commit(self: Box<Self>) -> Result<bool>;

    /// Abandon the transaction without committing any queued write — the
    /// caller read something that failed validation (e.g. `WalletNotFound`)
    /// before reaching a commit decision. Backends that hold server-side
    /// watch state (Redis's `WATCH`) must clear it here so the pooled
    /// connection is clean for its next borrower.
    async fn discard(self: Box<Self>) -> Result<()>;
}
