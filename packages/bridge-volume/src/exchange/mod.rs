//! Centralized exchange withdrawals
//!
//! Both backends implement [`CentralizedExchange`]; which one funds a given
//! network is a configuration choice ([`ExchangeKind`]).

mod binance;
mod okx;

pub use binance::BinanceClient;
pub use okx::OkxClient;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::BotError;

/// Which exchange backend a network is funded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    Binance,
    Okx,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Binance => write!(f, "binance"),
            ExchangeKind::Okx => write!(f, "okx"),
        }
    }
}

impl FromStr for ExchangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Ok(ExchangeKind::Binance),
            "okx" => Ok(ExchangeKind::Okx),
            other => Err(format!("unknown exchange '{}', expected binance or okx", other)),
        }
    }
}

/// A single coin withdrawal to an on-chain address
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawRequest {
    pub address: String,
    /// Network name as used by the chain registry (e.g. `BSC`, `Aptos`)
    pub network: String,
    pub coin: String,
    pub amount: f64,
}

/// Withdrawal capability shared by every exchange backend.
///
/// `withdraw` issues exactly one external withdrawal per call and carries
/// no idempotency key. Callers must only retry when the exchange reported a
/// rejection.
#[async_trait]
pub trait CentralizedExchange: Send + Sync {
    fn name(&self) -> &'static str;

    async fn withdraw(&self, request: &WithdrawRequest) -> Result<(), BotError>;

    /// Best-effort fee lookup, `None` when the exchange cannot tell.
    async fn quote_withdrawal_fee(&self, coin: &str, network: &str) -> Option<f64>;
}

/// HTTP client for exchange APIs, optionally tunneled through a proxy.
pub(crate) fn build_http_client(proxy: Option<&str>) -> Result<Client, BotError> {
    let mut builder = Client::builder().timeout(Duration::from_secs(30));
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| BotError::Configuration(format!("invalid exchange proxy: {}", e)))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| BotError::Configuration(format!("failed to create HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exchange_kind() {
        assert_eq!("Binance".parse::<ExchangeKind>(), Ok(ExchangeKind::Binance));
        assert_eq!(" okx ".parse::<ExchangeKind>(), Ok(ExchangeKind::Okx));
        assert!("kraken".parse::<ExchangeKind>().is_err());
    }

    #[test]
    fn test_proxy_client() {
        assert!(build_http_client(None).is_ok());
        assert!(build_http_client(Some("http://127.0.0.1:8080")).is_ok());
        assert!(matches!(
            build_http_client(Some("not a url")),
            Err(BotError::Configuration(_))
        ));
    }
}
