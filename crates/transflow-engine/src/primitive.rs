use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use transflow_core::{
    Config, Money, RecordedOutcome, Result, TransferCommand, TransferOutcome, TransflowError,
    WalletSnapshot, WalletStatus,
};
use transflow_kv::KvStore;

/// The watched-transaction step sequence, run once per attempt under the
/// caller's already-acquired multi-key lock.
pub struct TransferPrimitive {
    kv: Arc<dyn KvStore>,
    config: Config,
}

impl TransferPrimitive {
    pub fn new(kv: Arc<dyn KvStore>, config: Config) -> Self {
        Self { kv, config }
    }

    /// Run the primitive to completion, retrying an optimistic abort up to
    /// `tx_max_attempts` times before surfacing `ConcurrencyConflict`.
    pub async fn execute(&self, cmd: &TransferCommand) -> Result<TransferOutcome> {
        if cmd.amount().scale() != self.config.balance_scale {
            return Err(TransflowError::InvalidAmount(format!(
                "amount scale {} does not match the configured balance_scale {}",
                cmd.amount().scale(),
                self.config.balance_scale
            )));
        }

        for attempt in 0..self.config.tx_max_attempts {
            if let Some(outcome) = self.attempt(cmd).await? {
                return Ok(outcome);
            }
            tracing::debug!(op_id = %cmd.op_id(), attempt, "watched transaction aborted, retrying");
        }

        Err(TransflowError::ConcurrencyConflict {
            attempts: self.config.tx_max_attempts,
        })
    }

    /// One attempt. `Ok(None)` means the commit aborted because a watched
    /// key changed — the caller retries; every other outcome, success or
    /// domain failure, is final.
    async fn attempt(&self, cmd: &TransferCommand) -> Result<Option<TransferOutcome>> {
        let applied_key = cmd.op_id().applied_key();
        let from_key = cmd.from().wallet_key();
        let to_key = cmd.to().wallet_key();

        let mut tx = self
            .kv
            .begin_watch(&[from_key.clone(), to_key.clone(), applied_key.clone()])
            .await?;

        if let Some(raw) = tx.get(&applied_key).await? {
            tx.discard().await?;
            let recorded: RecordedOutcome = serde_json::from_str(&raw).map_err(|e| {
                tracing::error!(op_id = %cmd.op_id(), error = %e, "stored idempotency record is corrupt");
                TransflowError::Unavailable(Box::new(e))
            })?;
            return Ok(Some(recorded.into()));
        }

        let from_fields = tx.hget_multi(&from_key, &["balance", "status"]).await?;
        let to_fields = tx.hget_multi(&to_key, &["balance", "status"]).await?;

        let from_snapshot = match parse_snapshot(&from_fields) {
            Some(s) => s,
            None => {
                tx.discard().await?;
                return Err(TransflowError::WalletNotFound(cmd.from().as_str().to_string()));
            }
        };
        let to_snapshot = match parse_snapshot(&to_fields) {
            Some(s) => s,
            None => {
                tx.discard().await?;
                return Err(TransflowError::WalletNotFound(cmd.to().as_str().to_string()));
            }
        };

        if !from_snapshot.status.is_active() {
            tx.discard().await?;
            return Err(TransflowError::WalletInactive(cmd.from().as_str().to_string()));
        }
        if !to_snapshot.status.is_active() {
            tx.discard().await?;
            return Err(TransflowError::WalletInactive(cmd.to().as_str().to_string()));
        }
        if from_snapshot.balance < cmd.amount() {
            tx.discard().await?;
            return Err(TransflowError::InsufficientFunds {
                need: cmd.amount().to_string(),
                have: from_snapshot.balance.to_string(),
            });
        }

        let new_from = from_snapshot.balance - cmd.amount();
        let new_to = to_snapshot.balance + cmd.amount();

        let recorded = RecordedOutcome { new_from, new_to };
        let encoded = serde_json::to_string(&recorded).map_err(|e| {
            tracing::error!(op_id = %cmd.op_id(), error = %e, "failed to encode idempotency record");
            TransflowError::Unavailable(Box::new(e))
        })?;

        tx.queue_hset(&from_key, "balance", &new_from.to_string());
        tx.queue_hset(&to_key, "balance", &new_to.to_string());
        tx.queue_set(&applied_key, &encoded, Some(self.config.idempotency_ttl()));

        let committed = tx.commit().await?;
        if committed {
            Ok(Some(TransferOutcome {
                new_from,
                new_to,
                duplicate: false,
            }))
        } else {
            Ok(None)
        }
    }
}

fn parse_snapshot(fields: &HashMap<String, String>) -> Option<WalletSnapshot> {
    let balance_raw = fields.get("balance")?;
    let status_raw = fields.get("status")?;
    let balance = Money::from_str(balance_raw).ok()?;
    Some(WalletSnapshot {
        balance,
        status: WalletStatus::from_str(status_raw),
    })
}
