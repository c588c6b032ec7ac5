//! USD spot price lookups

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::BotError;

pub const DEFAULT_PRICE_FEED_URL: &str = "https://min-api.cryptocompare.com";

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Spot price of one `ticker` in USD
    async fn spot_usd(&self, ticker: &str) -> Result<f64, BotError>;
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(rename = "USD")]
    usd: Option<f64>,
}

/// CryptoCompare `/data/price` client
pub struct CryptoComparePriceFeed {
    base_url: String,
    client: Client,
}

impl CryptoComparePriceFeed {
    pub fn new(base_url: &str) -> Result<Self, BotError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| BotError::Configuration(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl PriceFeed for CryptoComparePriceFeed {
    async fn spot_usd(&self, ticker: &str) -> Result<f64, BotError> {
        let url = format!("{}/data/price?fsym={}&tsyms=USD", self.base_url, ticker);
        let body: PriceResponse = self.client.get(&url).send().await?.json().await?;
        price_from_response(ticker, body)
    }
}

fn price_from_response(ticker: &str, body: PriceResponse) -> Result<f64, BotError> {
    match body.usd {
        Some(price) if price > 0.0 => Ok(price),
        _ => Err(BotError::Transport(format!("no USD price for {}", ticker))),
    }
}
