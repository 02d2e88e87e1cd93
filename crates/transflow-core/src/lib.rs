//! transflow-core
//!
//! Shared types for the distributed wallet-transfer engine: monetary and
//! identifier types, the transfer command/outcome shapes, engine
//! configuration, and the error taxonomy every other `transflow-*` crate
//! returns through.

pub mod command;
pub mod config;
pub mod error;
pub mod token;
pub mod types;

pub use command::{RecordedOutcome, TransferCommand, TransferOutcome};
pub use config::Config;
pub use error::{Result, TransflowError};
pub use types::{Money, OpId, UserId, WalletSnapshot, WalletStatus};
