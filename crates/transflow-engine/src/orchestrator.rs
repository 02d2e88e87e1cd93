use std::sync::Arc;

use transflow_core::{Config, Result, TransferCommand, TransferOutcome};
use transflow_kv::KvStore;
use transflow_lock::MultiKeyLock;

use crate::idempotency::{CheckOutcome, IdempotencyGuard};
use crate::primitive::TransferPrimitive;

/// The public entry point: `transfer(op_id, from, to, amount)`. Owns the
/// lock and the transfer primitive; callers construct one per process and
/// share it across every command the worker handles.
pub struct TransferOrchestrator {
    kv: Arc<dyn KvStore>,
    lock: MultiKeyLock,
    primitive: TransferPrimitive,
}

impl TransferOrchestrator {
    pub fn new(kv: Arc<dyn KvStore>, config: Config) -> Self {
        Self {
            lock: MultiKeyLock::new(Arc::clone(&kv), config.clone()),
            primitive: TransferPrimitive::new(Arc::clone(&kv), config),
            kv,
        }
    }

    /// Validate, consult the idempotency guard, acquire the multi-key
    /// lock, invoke the transfer primitive under it, release
    /// unconditionally.
    pub async fn transfer(&self, command: TransferCommand) -> Result<TransferOutcome> {
        if let CheckOutcome::Applied(recorded) = IdempotencyGuard::new(self.kv.as_ref())
            .check(command.op_id())
            .await?
        {
            return Ok(recorded.into());
        }

        let lock_names = command.lock_names().to_vec();
        let guard = self.lock.acquire(&lock_names).await?;

        let result = self.primitive.execute(&command).await;

        guard.release().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use transflow_kv::InMemoryKv;

    use super::*;

    fn orchestrator_with(kv: InMemoryKv) -> (TransferOrchestrator, Arc<InMemoryKv>) {
        let kv = Arc::new(kv);
        let orchestrator = TransferOrchestrator::new(kv.clone() as Arc<dyn KvStore>, Config::default());
        (orchestrator, kv)
    }

    fn cmd(op_id: &str, from: &str, to: &str, amount: &str) -> TransferCommand {
        TransferCommand::new(op_id, from, to, amount.parse().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn transfers_and_releases_the_lock() {
        let kv = InMemoryKv::new();
        kv.seed_hash("wallet:alice", &[("balance", "100.00"), ("status", "active")]);
        kv.seed_hash("wallet:bob", &[("balance", "10.00"), ("status", "active")]);
        let (orchestrator, kv) = orchestrator_with(kv);

        let outcome = orchestrator.transfer(cmd("op-1", "alice", "bob", "25.00")).await.unwrap();
        assert_eq!(outcome.new_from.to_string(), "75.00");
        assert_eq!(outcome.new_to.to_string(), "35.00");

        // The lock must be free again for the next command.
        assert_eq!(kv.get("lock:alice").await.unwrap(), None);
        assert_eq!(kv.get("lock:bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_delivery_takes_no_lock_and_no_kv_write() {
        let kv = InMemoryKv::new();
        kv.seed_hash("wallet:alice", &[("balance", "100.00"), ("status", "active")]);
        kv.seed_hash("wallet:bob", &[("balance", "10.00"), ("status", "active")]);
        let (orchestrator, _kv) = orchestrator_with(kv);

        let first = orchestrator.transfer(cmd("op-1", "alice", "bob", "25.00")).await.unwrap();
        let second = orchestrator.transfer(cmd("op-1", "alice", "bob", "25.00")).await.unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(first.new_from, second.new_from);
        assert_eq!(first.new_to, second.new_to);
    }

    #[tokio::test]
    async fn releases_the_lock_even_on_domain_failure() {
        let kv = InMemoryKv::new();
        kv.seed_hash("wallet:alice", &[("balance", "1.00"), ("status", "active")]);
        kv.seed_hash("wallet:bob", &[("balance", "0.00"), ("status", "active")]);
        let (orchestrator, kv) = orchestrator_with(kv);

        let err = orchestrator.transfer(cmd("op-1", "alice", "bob", "50.00")).await.unwrap_err();
        assert!(matches!(err, transflow_core::TransflowError::InsufficientFunds { .. }));

        assert_eq!(kv.get("lock:alice").await.unwrap(), None);
        assert_eq!(kv.get("lock:bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn bidirectional_pair_transfers_serialise_without_deadlock() {
        let kv = InMemoryKv::new();
        kv.seed_hash("wallet:alice", &[("balance", "1000.00"), ("status", "active")]);
        kv.seed_hash("wallet:bob", &[("balance", "1000.00"), ("status", "active")]);
        let (orchestrator, kv) = orchestrator_with(kv);
        let orchestrator = Arc::new(orchestrator);

        // 100 transfers each direction, all in parallel: the pair's lock
        // names canonicalise to the same order regardless of who initiates,
        // so this must serialise cleanly rather than deadlock or ever
        // surface a `LockUnavailable`.
        let mut handles = Vec::with_capacity(200);
        for i in 0..100 {
            let orchestrator = Arc::clone(&orchestrator);
            let op_id = format!("op-a-{i}");
            handles.push(tokio::spawn(async move {
                orchestrator.transfer(cmd(&op_id, "alice", "bob", "1.00")).await
            }));
        }
        for i in 0..100 {
            let orchestrator = Arc::clone(&orchestrator);
            let op_id = format!("op-b-{i}");
            handles.push(tokio::spawn(async move {
                orchestrator.transfer(cmd(&op_id, "bob", "alice", "1.00")).await
            }));
        }

        let results = tokio::time::timeout(std::time::Duration::from_secs(30), async {
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(handle.await.unwrap());
            }
            results
        })
        .await
        .expect("200 transfers across a contended pair must complete without deadlocking");

        for result in &results {
            assert!(
                !matches!(result, Err(transflow_core::TransflowError::LockUnavailable { .. })),
                "contention on a single pair must resolve via backoff, not LockUnavailable: {result:?}"
            );
            result.as_ref().unwrap();
        }

        let alice = kv.hget_multi("wallet:alice", &["balance"]).await.unwrap();
        let bob = kv.hget_multi("wallet:bob", &["balance"]).await.unwrap();
        assert_eq!(alice.get("balance").unwrap(), "1000.00");
        assert_eq!(bob.get("balance").unwrap(), "1000.00");
    }

    #[tokio::test]
    async fn insufficient_balance_race_admits_exactly_three_of_five() {
        let kv = InMemoryKv::new();
        kv.seed_hash("wallet:user_1", &[("balance", "100.00"), ("status", "active")]);
        for recipient in ["user_2", "user_3", "user_4", "user_5", "user_6"] {
            kv.seed_hash(&format!("wallet:{recipient}"), &[("balance", "0.00"), ("status", "active")]);
        }
        let (orchestrator, kv) = orchestrator_with(kv);
        let orchestrator = Arc::new(orchestrator);

        let mut handles = Vec::new();
        for recipient in ["user_2", "user_3", "user_4", "user_5", "user_6"] {
            let orchestrator = Arc::clone(&orchestrator);
            let op_id = format!("op-{recipient}");
            handles.push(tokio::spawn(async move {
                orchestrator.transfer(cmd(&op_id, "user_1", recipient, "30.00")).await
            }));
        }

        let results = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(handle.await.unwrap());
            }
            results
        })
        .await
        .expect("five transfers from a single sender must all complete");

        let applied = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(transflow_core::TransflowError::InsufficientFunds { .. })))
            .count();
        assert_eq!(applied, 3);
        assert_eq!(insufficient, 2);

        let user_1 = kv.hget_multi("wallet:user_1", &["balance"]).await.unwrap();
        assert_eq!(user_1.get("balance").unwrap(), "10.00");

        let mut recipients_total = Decimal::ZERO;
        for recipient in ["user_2", "user_3", "user_4", "user_5", "user_6"] {
            let fields = kv.hget_multi(&format!("wallet:{recipient}"), &["balance"]).await.unwrap();
            recipients_total += fields.get("balance").unwrap().parse::<Decimal>().unwrap();
        }
        assert_eq!(recipients_total, "90.00".parse::<Decimal>().unwrap());
    }

    #[tokio::test]
    async fn rejects_self_transfer_before_touching_storage() {
        let kv = InMemoryKv::new();
        kv.seed_hash("wallet:alice", &[("balance", "100.00"), ("status", "active")]);
        let (orchestrator, _kv) = orchestrator_with(kv);

        let err = TransferCommand::new("op-1", "alice", "alice", "1.00".parse().unwrap()).unwrap_err();
        assert!(matches!(err, transflow_core::TransflowError::SameUserTransfer));
        // Constructing the command itself failed, so the orchestrator is
        // never reached — nothing left to assert beyond the error shape.
        let _ = orchestrator;
    }

    #[tokio::test]
    async fn transfer_chain_conserves_total_balance() {
        let kv = InMemoryKv::new();
        kv.seed_hash("wallet:a", &[("balance", "100.00"), ("status", "active")]);
        kv.seed_hash("wallet:b", &[("balance", "0.00"), ("status", "active")]);
        kv.seed_hash("wallet:c", &[("balance", "0.00"), ("status", "active")]);
        let (orchestrator, kv) = orchestrator_with(kv);

        orchestrator.transfer(cmd("op-1", "a", "b", "40.00")).await.unwrap();
        orchestrator.transfer(cmd("op-2", "b", "c", "15.00")).await.unwrap();

        let a = kv.hget_multi("wallet:a", &["balance"]).await.unwrap();
        let b = kv.hget_multi("wallet:b", &["balance"]).await.unwrap();
        let c = kv.hget_multi("wallet:c", &["balance"]).await.unwrap();
        assert_eq!(a.get("balance").unwrap(), "60.00");
        assert_eq!(b.get("balance").unwrap(), "25.00");
        assert_eq!(c.get("balance").unwrap(), "15.00");
    }

    #[tokio::test]
    async fn crash_recovery_via_ttl_lets_a_fresh_attempt_proceed() {
        let clock = Arc::new(transflow_kv::ManualClock::new());
        let kv = InMemoryKv::with_clock(clock.clone());
        kv.seed_hash("wallet:alice", &[("balance", "100.00"), ("status", "active")]);
        kv.seed_hash("wallet:bob", &[("balance", "0.00"), ("status", "active")]);
        let kv = Arc::new(kv);

        let mut config = Config::default();
        config.ttl_ms = 50;
        let orchestrator = TransferOrchestrator::new(kv.clone() as Arc<dyn KvStore>, config.clone());

        // Simulate a crashed holder: mint a lease directly, never release it.
        kv.set_if_absent("lock:alice", "stale-token", config.ttl()).await.unwrap();
        clock.advance(51);

        let outcome = orchestrator.transfer(cmd("op-1", "alice", "bob", "10.00")).await.unwrap();
        assert_eq!(outcome.new_from.to_string(), "90.00");
    }
}
