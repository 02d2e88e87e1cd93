use thiserror::Error;

/// Every failure the transfer engine can surface to a caller.
///
/// Variants are grouped by failure class — validation, domain, concurrency,
/// infrastructure — because callers branch on the group far more often
/// than on the individual variant (e.g. "is this retriable with the same
/// op_id?").
#[derive(Debug, Error)]
pub enum TransflowError {
    // ── Validation — caller error, no state touched, not retriable ──────────
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("from and to must differ")]
    SameUserTransfer,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    // ── Domain — business-rule rejection, no state touched ──────────────────
    #[error("insufficient funds: need {need}, have {have}")]
    InsufficientFunds { need: String, have: String },

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("wallet inactive: {0}")]
    WalletInactive(String),

    // ── Concurrency — transient, safe to retry with the same op_id ──────────
    #[error("lock unavailable after {attempts} attempts")]
    LockUnavailable { attempts: u32 },

    #[error("concurrency conflict after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },

    #[error("operation cancelled")]
    Cancelled,

    // ── Infrastructure — KV or bus I/O failure ───────────────────────────────
    #[error("backend unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransflowError {
    /// Whether a caller may safely retry this exact `op_id` and expect
    /// idempotency to make the retry harmless.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransflowError::LockUnavailable { .. }
                | TransflowError::ConcurrencyConflict { .. }
                | TransflowError::Unavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransflowError>;
