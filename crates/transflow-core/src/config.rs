use crate::error::{Result, TransflowError};

/// The engine's full configuration surface — enumerated, no other knobs.
/// Constructed explicitly by the caller at orchestrator construction time;
/// there is no singleton and no file-format loader. Configuration is
/// always passed explicitly to the orchestrator at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Lease duration for an acquired lock, in milliseconds.
    pub ttl_ms: u64,
    /// Backoff base delay between acquisition retries, in milliseconds.
    pub base_retry_delay_ms: u64,
    /// Backoff cap, in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Give-up threshold for lock acquisition.
    pub max_retries: u32,
    /// Bounded retry count for a watched-transaction optimistic abort.
    pub tx_max_attempts: u32,
    /// Retention for idempotency records, in seconds.
    pub idempotency_ttl_s: u64,
    /// Fractional digits every balance and amount is scaled to.
    pub balance_scale: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl_ms: 10_000,
            base_retry_delay_ms: 100,
            max_retry_delay_ms: 2_000,
            max_retries: 10,
            tx_max_attempts: 3,
            idempotency_ttl_s: 86_400,
            balance_scale: 2,
        }
    }
}

impl Config {
    /// Reject configurations that can't possibly behave sensibly.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(TransflowError::InvalidRequest(
                "max_retries must be at least 1".into(),
            ));
        }
        if self.tx_max_attempts == 0 {
            return Err(TransflowError::InvalidRequest(
                "tx_max_attempts must be at least 1".into(),
            ));
        }
        if self.base_retry_delay_ms > self.max_retry_delay_ms {
            return Err(TransflowError::InvalidRequest(
                "base_retry_delay_ms must not exceed max_retry_delay_ms".into(),
            ));
        }
        if self.ttl_ms == 0 {
            return Err(TransflowError::InvalidRequest(
                "ttl_ms must be positive".into(),
            ));
        }
        // rust_decimal::Decimal caps scale at 28.
        if self.balance_scale > 28 {
            return Err(TransflowError::InvalidRequest(
                "balance_scale must not exceed 28".into(),
            ));
        }
        Ok(())
    }

    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ttl_ms)
    }

    pub fn idempotency_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idempotency_ttl_s)
    }
}
