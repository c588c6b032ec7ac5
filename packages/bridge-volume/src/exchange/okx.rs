//! OKX withdrawal client (`timestamp+method+path+body` signing)

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

use super::{build_http_client, CentralizedExchange, WithdrawRequest};
use crate::config::OkxConfig;
use crate::error::BotError;

const NAME: &str = "okx";
pub const OKX_API_URL: &str = "https://www.okx.com";
const WITHDRAW_PATH: &str = "/api/v5/asset/withdrawal";
const CURRENCIES_PATH: &str = "/api/v5/asset/currencies";

/// Generic OKX v5 envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Currency {
    ccy: String,
    chain: String,
    #[serde(rename = "minFee", default)]
    min_fee: String,
}

#[derive(Debug, Serialize)]
struct WithdrawBody {
    ccy: String,
    amt: String,
    /// 4 = on-chain withdrawal
    dest: &'static str,
    #[serde(rename = "toAddr")]
    to_addr: String,
    chain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee: Option<String>,
}

pub struct OkxClient {
    config: OkxConfig,
    base_url: String,
    client: Client,
}

impl OkxClient {
    pub fn new(config: OkxConfig) -> Result<Self, BotError> {
        Self::with_base_url(config, OKX_API_URL)
    }

    pub fn with_base_url(config: OkxConfig, base_url: &str) -> Result<Self, BotError> {
        let client = build_http_client(config.proxy.as_deref())?;
        Ok(Self {
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Signed call. `path` includes the query string for GET requests.
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<Envelope<T>, BotError> {
        let timestamp = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let payload = body.clone().unwrap_or_default();
        let signature = sign_request(
            self.config.secret.expose(),
            &timestamp,
            method.as_str(),
            path,
            &payload,
        )?;

        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("OK-ACCESS-KEY", self.config.api_key.expose())
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", timestamp)
            .header("OK-ACCESS-PASSPHRASE", self.config.passphrase.expose())
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let envelope: Envelope<T> = builder.send().await?.json().await?;
        if envelope.code != "0" {
            return Err(BotError::ExchangeRejection {
                exchange: NAME,
                reason: format!("code {}: {}", envelope.code, envelope.msg),
            });
        }
        Ok(envelope)
    }
}

#[async_trait]
impl CentralizedExchange for OkxClient {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn withdraw(&self, request: &WithdrawRequest) -> Result<(), BotError> {
        let fee = self
            .quote_withdrawal_fee(&request.coin, &request.network)
            .await;
        let body = withdraw_body(request, fee);

        info!(
            address = %request.address,
            coin = %request.coin,
            chain = %body.chain,
            amount = %body.amt,
            "OKX withdraw"
        );

        let payload = serde_json::to_string(&body).map_err(|e| BotError::WithdrawFailed {
            exchange: NAME,
            reason: e.to_string(),
        })?;

        match self
            .request::<serde_json::Value>(Method::POST, WITHDRAW_PATH, Some(payload))
            .await
        {
            Ok(_) => {
                info!(address = %request.address, "OKX withdraw accepted");
                Ok(())
            }
            Err(e) => {
                warn!(address = %request.address, error = %e, "OKX withdraw failed");
                Err(BotError::WithdrawFailed {
                    exchange: NAME,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn quote_withdrawal_fee(&self, coin: &str, network: &str) -> Option<f64> {
        let path = format!("{}?ccy={}", CURRENCIES_PATH, coin);
        let envelope = match self.request::<Currency>(Method::GET, &path, None).await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "OKX fee lookup failed");
                return None;
            }
        };

        let chain = okx_chain(coin, network);
        envelope
            .data
            .iter()
            .find(|c| c.ccy.eq_ignore_ascii_case(coin) && c.chain.eq_ignore_ascii_case(&chain))
            .and_then(|c| c.min_fee.parse().ok())
    }
}

/// OKX chain label, e.g. `APT-Aptos`
pub fn okx_chain(coin: &str, network: &str) -> String {
    format!("{}-{}", coin, network)
}

fn withdraw_body(request: &WithdrawRequest, fee: Option<f64>) -> WithdrawBody {
    WithdrawBody {
        ccy: request.coin.clone(),
        amt: format!("{:.5}", request.amount),
        dest: "4",
        to_addr: request.address.clone(),
        chain: okx_chain(&request.coin, &request.network),
        fee: fee.map(|f| f.to_string()),
    }
}

/// Base64 HMAC-SHA256 over `timestamp + method + path + body`
pub fn sign_request(
    secret: &str,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &str,
) -> Result<String, BotError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| BotError::Configuration(format!("invalid OKX secret: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}
