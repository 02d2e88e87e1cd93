//! transflow-lock
//!
//! The multi-key distributed lock: ordered acquisition over a canonical
//! lock-name set, token-based ownership, bounded exponential backoff with
//! jitter, and TTL-bounded crash recovery.

pub mod backoff;
pub mod guard;
pub mod lock;

pub use guard::LockGuard;
pub use lock::MultiKeyLock;
