//! Error taxonomy shared by the exchange, chain and orchestration layers
//!
//! Library code returns [`BotError`]; the binary wraps it in `eyre` at the edge.

use thiserror::Error;

/// Substrings emitted by EVM nodes and the hub REST API when an account
/// cannot cover the value or gas of a transaction.
const INSUFFICIENT_FUNDS_MARKERS: &[&str] = &[
    "insufficient funds",
    "exceeds the balance",
    "not enough balance",
    "gas required exceeds allowance",
    "insufficient balance",
    "execution reverted for an unknown reason",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BotError {
    /// Network or HTTP failure before a meaningful response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// Exchange answered with a non-success body
    #[error("{exchange} rejected request: {reason}")]
    ExchangeRejection {
        exchange: &'static str,
        reason: String,
    },

    #[error("{exchange} withdrawal failed: {reason}")]
    WithdrawFailed {
        exchange: &'static str,
        reason: String,
    },

    #[error("transaction {tx_hash} reverted")]
    TransactionReverted { tx_hash: String },

    #[error("transaction {tx_hash} not confirmed within {timeout_secs}s")]
    TransactionTimeout { tx_hash: String, timeout_secs: u64 },

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Any other node-side error
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BotError {
    /// Wrap a raw node error, surfacing balance problems as their own kind.
    pub fn from_rpc(message: impl Into<String>) -> Self {
        let message = message.into();
        if classify_insufficient_funds(&message) {
            BotError::InsufficientFunds(message)
        } else {
            BotError::Rpc(message)
        }
    }

    pub fn is_insufficient_funds(&self) -> bool {
        match self {
            BotError::InsufficientFunds(_) => true,
            // Exchange and transport messages never carry node balance errors
            BotError::Rpc(msg) => classify_insufficient_funds(msg),
            _ => false,
        }
    }

    /// Fatal errors are never retried by the bridge and deposit loops.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BotError::UnknownChain(_) | BotError::Configuration(_)
        )
    }
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        BotError::Transport(e.to_string())
    }
}

/// Substring classification of "cannot pay for this transaction" errors.
///
/// Only used for clients that expose nothing better than a message string.
pub fn classify_insufficient_funds(message: &str) -> bool {
    let lower = message.to_lowercase();
    INSUFFICIENT_FUNDS_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}
