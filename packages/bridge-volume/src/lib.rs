//! Bridge volume bot - Library interface
//!
//! Re-exports internal modules for use by the binary and integration tests.

pub mod accounts;
pub mod balance;
pub mod bridge;
pub mod chains;
pub mod config;
pub mod context;
pub mod contracts;
pub mod driver;
pub mod error;
pub mod evm;
pub mod exchange;
pub mod funding;
pub mod hub;
pub mod notify;
pub mod pacing;
pub mod price;
pub mod redact;
pub mod retry;
pub mod units;
pub mod volume;
pub mod wallets;
