//! transflow-kv
//!
//! The KV client adapter: the single capability boundary (`KvStore` /
//! `WatchedTx`) the lock and transfer primitives talk to, plus the two
//! implementations of it — `RedisKv` for production and `InMemoryKv` for
//! tests.

pub mod clock;
pub mod memory_kv;
pub mod redis_kv;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory_kv::InMemoryKv;
pub use redis_kv::RedisKv;
pub use store::{KvStore, WatchedTx};
