use std::sync::Arc;

use transflow_kv::KvStore;

/// A held set of lock leases, all minted under the same token. The caller
/// must call `release` explicitly on every exit path; `Drop` cannot run
/// async code and so cannot perform the actual KV delete — it only warns,
/// as a signal that a future exit path forgot to release and the lease
/// will sit until its TTL expires.
pub struct LockGuard {
    token: String,
    names: Vec<String>,
    kv: Arc<dyn KvStore>,
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(token: String, names: Vec<String>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            token,
            names,
            kv,
            released: false,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Release every held name. A name whose `delete_if_equal` returns
    /// `false` — someone else's token is there, or it already expired — is
    /// logged and otherwise ignored: releasing what you don't own is a
    /// no-op.
    pub async fn release(mut self) {
        for name in &self.names {
            let key = format!("lock:{name}");
            match self.kv.delete_if_equal(&key, &self.token).await {
                Ok(true) => tracing::trace!(lock = %name, "released"),
                Ok(false) => tracing::debug!(lock = %name, "release was a no-op (expired or not ours)"),
                Err(error) => tracing::warn!(lock = %name, %error, "release failed; relying on TTL expiry"),
            }
        }
        self.released = true;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                names = ?self.names,
                "lock guard dropped without release; leases will expire via TTL"
            );
        }
    }
}
