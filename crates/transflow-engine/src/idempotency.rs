use transflow_core::{OpId, RecordedOutcome, Result, TransflowError};
use transflow_kv::KvStore;

/// The check/record contract for duplicate detection. `check` is a fast
/// path only — the authoritative guarantee is the `applied:<op_id>` write
/// happening inside the same atomic batch as the balance mutation in
/// `TransferPrimitive`; this type never issues that write itself.
pub struct IdempotencyGuard<'a> {
    kv: &'a dyn KvStore,
}

/// The outcome of consulting the guard before acquiring any lock.
pub enum CheckOutcome {
    NotApplied,
    Applied(RecordedOutcome),
}

impl<'a> IdempotencyGuard<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self { kv }
    }

    pub async fn check(&self, op_id: &OpId) -> Result<CheckOutcome> {
        match self.kv.get(&op_id.applied_key()).await? {
            None => Ok(CheckOutcome::NotApplied),
            Some(raw) => {
                let recorded = serde_json::from_str(&raw).map_err(|e| {
                    tracing::error!(op_id = %op_id, error = %e, "stored idempotency record is corrupt");
                    TransflowError::Unavailable(Box::new(e))
                })?;
                Ok(CheckOutcome::Applied(recorded))
            }
        }
    }
}
