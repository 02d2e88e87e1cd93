use std::sync::Arc;

use transflow_core::token::random_token;
use transflow_core::{Config, Result, TransflowError};
use transflow_kv::KvStore;

use crate::backoff::backoff_delay;
use crate::guard::LockGuard;

/// Acquires and releases an ordered set of named leases atomically, with
/// retry and token-based ownership.
pub struct MultiKeyLock {
    kv: Arc<dyn KvStore>,
    config: Config,
}

impl MultiKeyLock {
    pub fn new(kv: Arc<dyn KvStore>, config: Config) -> Self {
        Self { kv, config }
    }

    /// Acquire a lease on every name or none. Names are canonicalised —
    /// deduplicated and sorted byte-wise — before any KV call, so two
    /// acquirers racing over an overlapping set always request in the same
    /// order and a wait-cycle is structurally impossible.
    pub async fn acquire(&self, names: &[String]) -> Result<LockGuard> {
        let mut sorted: Vec<String> = names.to_vec();
        sorted.sort();
        sorted.dedup();

        if sorted.is_empty() {
            return Err(TransflowError::InvalidRequest(
                "lock acquisition requires at least one name".into(),
            ));
        }

        for attempt in 0..self.config.max_retries {
            let token = random_token();
            let mut held = Vec::with_capacity(sorted.len());
            let mut blocked = false;

            for name in &sorted {
                let key = format!("lock:{name}");
                match self.kv.set_if_absent(&key, &token, self.config.ttl()).await {
                    Ok(true) => held.push(name.clone()),
                    Ok(false) => {
                        blocked = true;
                        break;
                    }
                    Err(error) => {
                        self.release_all(&held, &token).await;
                        return Err(error);
                    }
                }
            }

            if !blocked {
                tracing::trace!(names = ?sorted, attempt, "acquired multi-key lock");
                return Ok(LockGuard::new(token, held, Arc::clone(&self.kv)));
            }

            self.release_all(&held, &token).await;

            if attempt + 1 == self.config.max_retries {
                break;
            }

            let delay = backoff_delay(attempt, self.config.base_retry_delay_ms, self.config.max_retry_delay_ms);
            tracing::warn!(names = ?sorted, attempt, delay_ms = delay.as_millis() as u64, "lock contended, backing off");
            tokio::time::sleep(delay).await;
        }

        Err(TransflowError::LockUnavailable {
            attempts: self.config.max_retries,
        })
    }

    async fn release_all(&self, held: &[String], token: &str) {
        for name in held {
            let key = format!("lock:{name}");
            if let Err(error) = self.kv.delete_if_equal(&key, token).await {
                tracing::warn!(lock = %name, %error, "rollback release failed; relying on TTL expiry");
            }
        }
    }
}
