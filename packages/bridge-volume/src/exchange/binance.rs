//! Binance withdrawal client (query-string HMAC signing)

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

use super::{build_http_client, CentralizedExchange, WithdrawRequest};
use crate::config::BinanceConfig;
use crate::error::BotError;
use crate::pacing::random_float;

const NAME: &str = "binance";
pub const BINANCE_API_URL: &str = "https://api.binance.com";

/// BNB withdrawals on BSC at or below this are raised into the minimum band
const BSC_MIN_BNB_WITHDRAW: f64 = 0.0046;

#[derive(Debug, Deserialize)]
struct SubAccountList {
    #[serde(rename = "subAccounts", default)]
    sub_accounts: Vec<SubAccount>,
}

#[derive(Debug, Deserialize)]
struct SubAccount {
    email: String,
}

#[derive(Debug, Deserialize)]
struct SubAccountAssets {
    #[serde(default)]
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CoinConfig {
    coin: String,
    #[serde(rename = "networkList", default)]
    network_list: Vec<CoinNetwork>,
}

#[derive(Debug, Deserialize)]
struct CoinNetwork {
    network: String,
    #[serde(rename = "withdrawFee")]
    withdraw_fee: String,
}

pub struct BinanceClient {
    config: BinanceConfig,
    base_url: String,
    client: Client,
}

impl BinanceClient {
    pub fn new(config: BinanceConfig) -> Result<Self, BotError> {
        Self::with_base_url(config, BINANCE_API_URL)
    }

    pub fn with_base_url(config: BinanceConfig, base_url: &str) -> Result<Self, BotError> {
        let client = build_http_client(config.proxy.as_deref())?;
        Ok(Self {
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Sign `params` plus a timestamp and send them as the query string.
    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, BotError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut query = format!("timestamp={}", timestamp);
        for (key, value) in params {
            query.push_str(&format!("&{}={}", key, value));
        }
        let signature = sign_query(self.config.secret.expose(), &query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", self.config.api_key.expose())
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            let reason = body
                .get("msg")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(BotError::ExchangeRejection {
                exchange: NAME,
                reason,
            });
        }
        Ok(body)
    }

    /// Move the free `coin` balance of every sub-account into the master account.
    async fn sweep_sub_accounts(&self, coin: &str) -> Result<(), BotError> {
        let list: SubAccountList = parse(
            self.signed_request(Method::GET, "/sapi/v1/sub-account/list", &[])
                .await?,
        )?;

        for account in list.sub_accounts {
            let assets: SubAccountAssets = parse(
                self.signed_request(
                    Method::GET,
                    "/sapi/v4/sub-account/assets",
                    &[("email", account.email.clone())],
                )
                .await?,
            )?;

            let free = assets
                .balances
                .iter()
                .find(|b| b.asset.eq_ignore_ascii_case(coin))
                .map(|b| json_number(&b.free))
                .unwrap_or(0.0);

            if free <= 0.0 {
                continue;
            }

            debug!(email = %account.email, coin, amount = free, "Sweeping sub-account balance");
            self.signed_request(
                Method::POST,
                "/sapi/v1/sub-account/universalTransfer",
                &[
                    ("fromEmail", account.email.clone()),
                    ("fromAccountType", "SPOT".to_string()),
                    ("toAccountType", "SPOT".to_string()),
                    ("asset", coin.to_string()),
                    ("amount", free.to_string()),
                ],
            )
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl CentralizedExchange for BinanceClient {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn withdraw(&self, request: &WithdrawRequest) -> Result<(), BotError> {
        let network = binance_network(&request.network);
        let amount = adjust_amount(&network, &request.coin, request.amount);

        let result = async {
            self.sweep_sub_accounts(&request.coin).await?;

            info!(
                address = %request.address,
                coin = %request.coin,
                network = %network,
                amount = format!("{:.5}", amount),
                "Binance withdraw"
            );

            self.signed_request(
                Method::POST,
                "/sapi/v1/capital/withdraw/apply",
                &[
                    ("coin", request.coin.clone()),
                    ("network", network.clone()),
                    ("address", request.address.clone()),
                    ("amount", format!("{:.5}", amount)),
                ],
            )
            .await
        }
        .await;

        match result {
            Ok(body) => {
                let id = body.get("id").cloned().unwrap_or_default();
                info!(address = %request.address, id = %id, "Binance withdraw accepted");
                Ok(())
            }
            Err(e) => {
                warn!(address = %request.address, error = %e, "Binance withdraw failed");
                Err(BotError::WithdrawFailed {
                    exchange: NAME,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn quote_withdrawal_fee(&self, coin: &str, network: &str) -> Option<f64> {
        let network = binance_network(network);
        let body = match self
            .signed_request(Method::GET, "/sapi/v1/capital/config/getall", &[])
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Binance fee lookup failed");
                return None;
            }
        };

        let coins: Vec<CoinConfig> = parse(body).ok()?;
        coins
            .iter()
            .find(|c| c.coin.eq_ignore_ascii_case(coin))?
            .network_list
            .iter()
            .find(|n| n.network.eq_ignore_ascii_case(&network))?
            .withdraw_fee
            .parse()
            .ok()
    }
}

/// Binance network code for a registry network name
pub fn binance_network(network: &str) -> String {
    match network.to_uppercase().as_str() {
        "AVALANCHE" => "AVAXC".to_string(),
        other => other.to_string(),
    }
}

/// Raise tiny BNB withdrawals on BSC above the exchange minimum.
pub fn adjust_amount(network: &str, coin: &str, amount: f64) -> f64 {
    if network == "BSC" && coin.eq_ignore_ascii_case("BNB") && amount <= BSC_MIN_BNB_WITHDRAW {
        random_float(0.005, 0.0051)
    } else {
        amount
    }
}

/// Hex HMAC-SHA256 of a query string
pub fn sign_query(secret: &str, query: &str) -> Result<String, BotError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| BotError::Configuration(format!("invalid Binance secret: {}", e)))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, BotError> {
    serde_json::from_value(value).map_err(|e| BotError::ExchangeRejection {
        exchange: NAME,
        reason: format!("unexpected response: {}", e),
    })
}

/// Binance reports amounts either as strings or numbers
fn json_number(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::String(s) => s.parse().unwrap_or(0.0),
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}
