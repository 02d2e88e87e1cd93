use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use transflow_core::Result;

use crate::clock::{Clock, SystemClock};
use crate::store::{KvStore, WatchedTx};

#[derive(Clone)]
struct StringEntry {
    value: String,
    expires_at_ms: Option<u64>,
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, StringEntry>,
    hashes: HashMap<String, HashMap<String, String>>,
    /// Bumped on every mutation to `key` (string write/delete or hash field
    /// write), regardless of which operation touched it. This is the
    /// version number `begin_watch`/`commit` compare to detect a change.
    versions: HashMap<String, u64>,
}

impl Inner {
    fn bump(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    fn version_of(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn string_is_live(&self, key: &str, now_ms: u64) -> bool {
        self.strings
            .get(key)
            .map(|e| e.expires_at_ms.map(|exp| now_ms < exp).unwrap_or(true))
            .unwrap_or(false)
    }
}

/// An in-process fake of a shared key-value store, used throughout
/// `transflow-lock` and `transflow-engine`'s test suites so they exercise
/// the real lock/transfer logic without a network. TTL is measured against
/// an injected `Clock` rather than the wall clock, so tests can simulate
/// lease expiry deterministically and instantly.
pub struct InMemoryKv {
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Directly seed a wallet hash — test convenience only, bypasses
    /// version bumping since no watcher could have observed the key yet.
    pub fn seed_hash(&self, key: &str, fields: &[(&str, &str)]) {
        let mut inner = self.inner.lock().expect("inmemory kv mutex poisoned");
        let entry = inner.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert((*field).to_string(), (*value).to_string());
        }
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().expect("inmemory kv mutex poisoned");
        if inner.string_is_live(key, now) {
            return Ok(false);
        }
        inner.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at_ms: Some(now + ttl.as_millis() as u64),
            },
        );
        inner.bump(key);
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now_ms();
        let inner = self.inner.lock().expect("inmemory kv mutex poisoned");
        if !inner.string_is_live(key, now) {
            return Ok(None);
        }
        Ok(inner.strings.get(key).map(|e| e.value.clone()))
    }

    async fn delete_if_equal(&self, key: &str, value: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().expect("inmemory kv mutex poisoned");
        if !inner.string_is_live(key, now) {
            return Ok(false);
        }
        let matches = inner.strings.get(key).map(|e| e.value == value).unwrap_or(false);
        if matches {
            inner.strings.remove(key);
            inner.bump(key);
        }
        Ok(matches)
    }

    async fn hget_multi(&self, key: &str, fields: &[&str]) -> Result<HashMap<String, String>> {
        let inner = self.inner.lock().expect("inmemory kv mutex poisoned");
        let mut out = HashMap::new();
        if let Some(hash) = inner.hashes.get(key) {
            for field in fields {
                if let Some(v) = hash.get(*field) {
                    out.insert((*field).to_string(), v.clone());
                }
            }
        }
        Ok(out)
    }

    async fn begin_watch(&self, watched_keys: &[String]) -> Result<Box<dyn WatchedTx>> {
        let inner = self.inner.lock().expect("inmemory kv mutex poisoned");
        let snapshot = watched_keys
            .iter()
            .map(|k| (k.clone(), inner.version_of(k)))
            .collect();
        drop(inner);
        Ok(Box::new(InMemoryWatchedTx {
            clock: Arc::clone(&self.clock),
            shared: Arc::clone(&self.inner),
            watched_versions: snapshot,
            staged: Vec::new(),
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

struct InMemoryWatchedTx {
    clock: Arc<dyn Clock>,
    shared: Arc<Mutex<Inner>>,
    watched_versions: HashMap<String, u64>,
    staged: Vec<StagedOp>,
}

#[async_trait]
impl WatchedTx for InMemoryWatchedTx {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now_ms();
        let inner = self.shared.lock().expect("inmemory kv mutex poisoned");
        if !inner.string_is_live(key, now) {
            return Ok(None);
        }
        Ok(inner.strings.get(key).map(|e| e.value.clone()))
    }

    async fn hget_multi(&mut self, key: &str, fields: &[&str]) -> Result<HashMap<String, String>> {
        let inner = self.shared.lock().expect("inmemory kv mutex poisoned");
        let mut out = HashMap::new();
        if let Some(hash) = inner.hashes.get(key) {
            for field in fields {
                if let Some(v) = hash.get(*field) {
                    out.insert((*field).to_string(), v.clone());
                }
            }
        }
        Ok(out)
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

    async fn commit(self: Box<Self>) -> Result<bool> {
        let now = self.clock.now_ms();
        let mut inner = self.shared.lock().expect("inmemory kv mutex poisoned");

        for (key, snapshot_version) in &self.watched_versions {
            if inner.version_of(key) != *snapshot_version {
                return Ok(false);
            }
        }

        for op in self.staged {
            match op {
                StagedOp::Set { key, value, ttl } => {
                    inner.strings.insert(
                        key.clone(),
                        StringEntry {
                            value,
                            expires_at_ms: ttl.map(|d| now + d.as_millis() as u64),
                        },
                    );
                    inner.bump(&key);
                }
                StagedOp::HSet { key, field, value } => {
                    inner.hashes.entry(key.clone()).or_default().insert(field, value);
                    inner.bump(&key);
                }
            }
        }

        Ok(true)
    }

    async fn discard(self: Box<Self>) -> Result<()> {
        // No server-side watch state to clear — `commit` reads the version
        // snapshot captured at `begin_watch` time regardless of whether
        // this handle is ever committed.
        Ok(())
    }
}
