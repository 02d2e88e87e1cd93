use std::convert::TryFrom;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransflowError};

/// Fixed-point monetary amount. Never a binary float.
pub type Money = Decimal;

/// Opaque user identifier, as assigned by the external account system.
///
/// The wallet schema is external to the engine: the engine treats the id
/// as an opaque, non-empty string key into `wallet:<user_id>`, never a
/// derived or hashed value of its own.
///
/// `#[serde(try_from = "String")]` routes deserialization through `new`,
/// so a deserialized id is just as non-empty as one built directly — the
/// inner field is private specifically so nothing can skip that check.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct UserId(String);

impl TryFrom<String> for UserId {
    type Error = TransflowError;

    fn try_from(id: String) -> Result<Self> {
        Self::new(id)
    }
}

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(TransflowError::InvalidRequest(
                "user id must not be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The KV key this user's wallet hash lives at.
    pub fn wallet_key(&self) -> String {
        format!("wallet:{}", self.0)
    }

    /// The lock name used to serialise transfers touching this user.
    /// Identical to the raw id — lock names and user ids share a namespace
    /// only inside `MultiKeyLock`, which prefixes with `lock:` itself.
    pub fn lock_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An operation id: the caller-supplied idempotency key for one logical
/// transfer. Opaque, non-empty, compared byte-for-byte.
///
/// Same `try_from` routing as `UserId` and for the same reason: deriving
/// `Deserialize` on the bare tuple field would bypass the non-empty check.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct OpId(String);

impl TryFrom<String> for OpId {
    type Error = TransflowError;

    fn try_from(id: String) -> Result<Self> {
        Self::new(id)
    }
}

impl OpId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(TransflowError::InvalidRequest(
                "op_id must not be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The KV key this op_id's idempotency record lives at.
    pub fn applied_key(&self) -> String {
        format!("applied:{}", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet state as read by the transfer primitive. Only the fields the
/// engine reads are modeled; additional descriptive fields may exist on
/// the wallet hash and the engine neither reads nor writes them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub balance: Money,
    pub status: WalletStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletStatus {
    Active,
    Other,
}

impl WalletStatus {
    pub fn from_str(s: &str) -> Self {
        if s == "active" {
            WalletStatus::Active
        } else {
            WalletStatus::Other
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, WalletStatus::Active)
    }
}
