//! transflow-engine
//!
//! The idempotency guard, the watched-transaction transfer primitive, and
//! the public orchestrator that ties lock acquisition, idempotency, and the
//! primitive together into `transfer(op_id, from, to, amount)`.

pub mod idempotency;
pub mod orchestrator;
pub mod primitive;

pub use idempotency::{CheckOutcome, IdempotencyGuard};
pub use orchestrator::TransferOrchestrator;
pub use primitive::TransferPrimitive;
