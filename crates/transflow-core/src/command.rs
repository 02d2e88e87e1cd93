use std::convert::TryFrom;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransflowError};
use crate::types::{Money, OpId, UserId};

/// A transfer command as delivered over the bus. Immutable once
/// constructed — the orchestrator never mutates a command it receives.
///
/// Fields are private so `TransferCommand::new` (and, for the wire path,
/// `TryFrom<RawTransferCommand>`) are the only ways to produce one — a
/// value in hand always satisfies `amount > 0` and `from != to`. Deriving
/// `Deserialize` directly on a struct with public fields would let a
/// deserialized command skip that check entirely; routing deserialization
/// through `RawTransferCommand` closes that path.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "RawTransferCommand")]
pub struct TransferCommand {
    op_id: OpId,
    from: UserId,
    to: UserId,
    amount: Money,
}

/// The wire shape of a `TransferCommand`: identical fields, no invariants
/// enforced. Exists only as a `Deserialize` target so every deserialized
/// command is funneled through `TransferCommand`'s validation before a
/// caller can ever observe one.
#[derive(Deserialize)]
struct RawTransferCommand {
    op_id: OpId,
    from: UserId,
    to: UserId,
    amount: Money,
}

impl TryFrom<RawTransferCommand> for TransferCommand {
    type Error = TransflowError;

    fn try_from(raw: RawTransferCommand) -> Result<Self> {
        Self::from_parts(raw.op_id, raw.from, raw.to, raw.amount)
    }
}

impl TransferCommand {
    /// Construct and validate argument shape: `amount > 0`, `from != to`,
    /// ids non-empty.
    ///
    /// Scale validation against `balance_scale` happens later, in the
    /// transfer primitive, since it needs the configured scale and this
    /// constructor does not take a `Config`.
    pub fn new(op_id: impl Into<String>, from: impl Into<String>, to: impl Into<String>, amount: Money) -> Result<Self> {
        let op_id = OpId::new(op_id)?;
        let from = UserId::new(from)?;
        let to = UserId::new(to)?;
        Self::from_parts(op_id, from, to, amount)
    }

    /// Shared validation for both construction paths: the string/typed
    /// constructor (`new`) and the deserialize path (`RawTransferCommand`).
    /// `op_id`/`from`/`to` are already validated non-empty by their own
    /// types by the time either path reaches here.
    fn from_parts(op_id: OpId, from: UserId, to: UserId, amount: Money) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(TransflowError::InvalidRequest(
                "amount must be strictly positive".into(),
            ));
        }
        if from == to {
            return Err(TransflowError::SameUserTransfer);
        }

        Ok(Self {
            op_id,
            from,
            to,
            amount,
        })
    }

    pub fn op_id(&self) -> &OpId {
        &self.op_id
    }

    pub fn from(&self) -> &UserId {
        &self.from
    }

    pub fn to(&self) -> &UserId {
        &self.to
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    /// The canonical, deduplicated, lexicographically sorted lock-name set
    /// for this command. `from != to` is already guaranteed by
    /// construction, so this is always exactly two names.
    pub fn lock_names(&self) -> [String; 2] {
        let mut names = [self.from.lock_name().to_string(), self.to.lock_name().to_string()];
        names.sort();
        names
    }
}

/// The successful result of a transfer, folding in the idempotency
/// fast-path flag (`Applied{new_from, new_to, duplicate}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub new_from: Money,
    pub new_to: Money,
    pub duplicate: bool,
}

/// The recorded outcome persisted at `applied:<op_id>`. This is
/// intentionally a subset of `TransferOutcome` — `duplicate` is a
/// property of *this call*, not of the committed fact, so it is computed
/// fresh on every idempotency hit rather than stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedOutcome {
    pub new_from: Money,
    pub new_to: Money,
}

impl From<RecordedOutcome> for TransferOutcome {
    fn from(r: RecordedOutcome) -> Self {
        TransferOutcome {
            new_from: r.new_from,
            new_to: r.new_to,
            duplicate: true,
        }
    }
}
