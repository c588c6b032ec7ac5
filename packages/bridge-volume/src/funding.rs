//! Funding planner
//!
//! Turns "top up this address" into a sized exchange withdrawal: draws a
//! USD amount from the configured range, converts it through the price
//! feed and routes it to the exchange configured for the network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::BotError;
use crate::exchange::{CentralizedExchange, ExchangeKind, WithdrawRequest};
use crate::pacing::{RandomRange, Sleeper};
use crate::price::PriceFeed;

/// Fixed wait between failed price lookups
pub const PRICE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// What a withdrawal is for; selects the USD sizing range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingPurpose {
    /// Native gas for the target network
    Gas,
    /// Working stablecoin balance
    Stable,
}

pub struct Funding {
    config: Arc<Config>,
    exchanges: HashMap<ExchangeKind, Arc<dyn CentralizedExchange>>,
    prices: Arc<dyn PriceFeed>,
    sleeper: Arc<dyn Sleeper>,
}

impl Funding {
    pub fn new(config: Arc<Config>, prices: Arc<dyn PriceFeed>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            config,
            exchanges: HashMap::new(),
            prices,
            sleeper,
        }
    }

    pub fn with_exchange(mut self, kind: ExchangeKind, exchange: Arc<dyn CentralizedExchange>) -> Self {
        self.exchanges.insert(kind, exchange);
        self
    }

    /// Exchange that funds `network`
    pub fn exchange_for(&self, network: &str) -> Result<&Arc<dyn CentralizedExchange>, BotError> {
        let kind = self.config.funding.exchange_for(network);
        self.exchanges.get(&kind).ok_or_else(|| {
            BotError::Configuration(format!("no {} client configured for {}", kind, network))
        })
    }

    /// Spot price in USD, retried until the feed answers.
    pub async fn spot_usd(&self, ticker: &str) -> f64 {
        loop {
            match self.prices.spot_usd(ticker).await {
                Ok(price) => return price,
                Err(e) => {
                    warn!(ticker, error = %e, "Price lookup failed, retrying");
                    self.sleeper.sleep(PRICE_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Token quantity worth `usd` at the current spot price
    pub async fn usd_to_tokens(&self, ticker: &str, usd: f64) -> f64 {
        usd / self.spot_usd(ticker).await
    }

    fn usd_range(&self, network: &str, purpose: FundingPurpose) -> Result<RandomRange<f64>, BotError> {
        match purpose {
            FundingPurpose::Stable => Ok(self.config.funding.stable_withdraw_usd),
            FundingPurpose::Gas => self
                .config
                .funding
                .gas_withdraw_range_for(network)
                .ok_or_else(|| {
                    BotError::Configuration(format!("no gas withdraw range for {}", network))
                }),
        }
    }

    /// Withdraw `coin` to `address` on `network`; returns the token amount requested.
    pub async fn withdraw(
        &self,
        coin: &str,
        network: &str,
        address: &str,
        purpose: FundingPurpose,
    ) -> Result<f64, BotError> {
        let exchange = self.exchange_for(network)?;
        let usd = self.usd_range(network, purpose)?.sample();
        let amount = self.usd_to_tokens(coin, usd).await;

        info!(
            exchange = exchange.name(),
            coin,
            network,
            address,
            usd = format!("{:.2}", usd),
            amount,
            ?purpose,
            "Requesting exchange withdrawal"
        );

        exchange
            .withdraw(&WithdrawRequest {
                address: address.to_string(),
                network: network.to_string(),
                coin: coin.to_string(),
                amount,
            })
            .await?;

        Ok(amount)
    }
}
