//! Aptos hub-chain account
//!
//! Talks to a fullnode REST API: reads coin balances through the view
//! endpoint, builds entry-function transactions via `encode_submission`,
//! signs them locally with ed25519 and polls until they are committed.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tiny_keccak::{Hasher, Sha3};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chains::{Chain, HubChain, TokenDescriptor};
use crate::error::BotError;
use crate::evm::address_to_bytes32;
use crate::redact::Redacted;

pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);
pub const MAX_GAS_AMOUNT: u64 = 12_000;
pub const GAS_UNIT_PRICE: u64 = 100;
const EXPIRATION_SECS: i64 = 600;

/// Version 1 adapter params with 150_000 destination gas
pub const BRIDGE_OUT_ADAPTER_PARAMS: &str = "0x000100000000000249f0";

/// ed25519 single-signer authentication key scheme byte
const ED25519_SCHEME: u8 = 0x00;

#[async_trait]
pub trait HubAccount: Send + Sync {
    /// `0x`-prefixed account address
    fn address(&self) -> &str;

    async fn coin_balance(&self, coin: &TokenDescriptor) -> Result<U256, BotError>;

    /// Bridge `amount` of the hub stablecoin to `recipient` on `destination`.
    async fn send_to_evm(
        &self,
        destination: &Chain,
        recipient: Address,
        amount: U256,
        fee_octas: u64,
    ) -> Result<String, BotError>;
}

#[derive(Debug, Deserialize)]
struct AccountResource {
    sequence_number: String,
}

#[derive(Debug, Deserialize)]
struct SubmittedTransaction {
    hash: String,
}

pub struct AptosAccount {
    hub: HubChain,
    signing_key: Redacted<SigningKey>,
    address: String,
    client: Client,
}

impl AptosAccount {
    pub fn new(hub: HubChain, private_key: &str) -> Result<Self, BotError> {
        let signing_key = parse_signing_key(private_key)?;
        let address = derive_address(&signing_key);
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BotError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        debug!(address = %address, rest_url = %hub.rest_url, "Hub account initialized");

        Ok(Self {
            hub,
            signing_key: Redacted::new(signing_key),
            address,
            client,
        })
    }

    async fn sequence_number(&self) -> Result<u64, BotError> {
        let url = format!("{}/accounts/{}", self.hub.rest_url, self.address);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::from_rpc(format!("account lookup failed: {}", body)));
        }
        let account: AccountResource = response.json().await?;
        account
            .sequence_number
            .parse()
            .map_err(|e| BotError::Rpc(format!("invalid sequence number: {}", e)))
    }

    /// Sign and submit an entry-function payload, returning the tx hash.
    async fn submit(&self, payload: Value) -> Result<String, BotError> {
        let sequence_number = self.sequence_number().await?;
        let expiration = chrono::Utc::now().timestamp() + EXPIRATION_SECS;
        let mut request = transaction_request(&self.address, sequence_number, expiration, payload);

        let encode_url = format!("{}/transactions/encode_submission", self.hub.rest_url);
        let response = self.client.post(&encode_url).json(&request).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::from_rpc(format!("encode_submission failed: {}", body)));
        }
        let signing_message: String = response.json().await?;
        let message = hex::decode(signing_message.trim_start_matches("0x"))
            .map_err(|e| BotError::Rpc(format!("invalid signing message: {}", e)))?;

        let key = self.signing_key.expose();
        let signature = key.sign(&message);
        request["signature"] = json!({
            "type": "ed25519_signature",
            "public_key": format!("0x{}", hex::encode(key.verifying_key().as_bytes())),
            "signature": format!("0x{}", hex::encode(signature.to_bytes())),
        });

        let submit_url = format!("{}/transactions", self.hub.rest_url);
        let response = self.client.post(&submit_url).json(&request).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::from_rpc(format!("submit failed: {}", body)));
        }
        let submitted: SubmittedTransaction = response.json().await?;
        Ok(submitted.hash)
    }

    /// Poll until the transaction is committed or the timeout passes.
    async fn wait_for_transaction(&self, hash: &str) -> Result<(), BotError> {
        let initial_delay = Duration::from_millis(500);
        let max_delay = Duration::from_secs(5);

        let start = Instant::now();
        let mut delay = initial_delay;
        let url = format!("{}/transactions/by_hash/{}", self.hub.rest_url, hash);

        while start.elapsed() < CONFIRMATION_TIMEOUT {
            tokio::time::sleep(delay).await;

            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let body: Value = response.json().await.unwrap_or_default();
                    match transaction_outcome(&body) {
                        Some(true) => {
                            debug!(hash, "Hub transaction committed");
                            return Ok(());
                        }
                        Some(false) => {
                            let vm_status = body
                                .get("vm_status")
                                .and_then(|v| v.as_str())
                                .unwrap_or("unknown");
                            warn!(hash, vm_status, "Hub transaction failed");
                            return Err(BotError::TransactionReverted {
                                tx_hash: hash.to_string(),
                            });
                        }
                        None => debug!(hash, "Hub transaction pending"),
                    }
                }
                Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                    debug!(hash, elapsed_ms = start.elapsed().as_millis(), "Hub transaction not yet indexed");
                }
                Ok(response) => {
                    debug!(hash, status = %response.status(), "Unexpected status while polling");
                }
                Err(e) => {
                    debug!(hash, error = %e, "Error polling hub transaction");
                }
            }

            delay = std::cmp::min(delay * 2, max_delay);
        }

        Err(BotError::TransactionTimeout {
            tx_hash: hash.to_string(),
            timeout_secs: CONFIRMATION_TIMEOUT.as_secs(),
        })
    }
}

#[async_trait]
impl HubAccount for AptosAccount {
    fn address(&self) -> &str {
        &self.address
    }

    async fn coin_balance(&self, coin: &TokenDescriptor) -> Result<U256, BotError> {
        let coin_type = coin.address.as_deref().ok_or_else(|| {
            BotError::Configuration(format!("{} has no hub coin type", coin.ticker))
        })?;

        let url = format!("{}/view", self.hub.rest_url);
        let body = json!({
            "function": "0x1::coin::balance",
            "type_arguments": [coin_type],
            "arguments": [self.address],
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body.to_string();
            if is_missing_coin_store(&message) {
                return Ok(U256::ZERO);
            }
            return Err(BotError::from_rpc(format!("balance view failed: {}", message)));
        }
        parse_view_u64(&body)
    }

    async fn send_to_evm(
        &self,
        destination: &Chain,
        recipient: Address,
        amount: U256,
        fee_octas: u64,
    ) -> Result<String, BotError> {
        let payload = bridge_payload(&self.hub, destination, recipient, amount, fee_octas);

        debug!(
            from = %self.address,
            to_chain = %destination.name,
            amount = %amount,
            fee_octas,
            "Submitting hub bridge transaction"
        );

        let hash = self.submit(payload).await?;
        info!(
            explorer = %self.hub.explorer_link(&hash),
            to_chain = %destination.name,
            "Hub bridge transaction sent"
        );

        self.wait_for_transaction(&hash).await?;
        Ok(hash)
    }
}

/// Accepts raw hex with an optional `0x` or `ed25519-priv-0x` prefix.
pub fn parse_signing_key(private_key: &str) -> Result<SigningKey, BotError> {
    let raw = private_key.trim();
    let raw = raw.strip_prefix("ed25519-priv-").unwrap_or(raw);
    let raw = raw.strip_prefix("0x").unwrap_or(raw);

    let bytes: [u8; 32] = hex::decode(raw)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| BotError::Configuration("invalid hub private key".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Account address: `sha3_256(public_key | scheme)`
pub fn derive_address(key: &SigningKey) -> String {
    let mut hasher = Sha3::v256();
    hasher.update(key.verifying_key().as_bytes());
    hasher.update(&[ED25519_SCHEME]);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    format!("0x{}", hex::encode(out))
}

fn transaction_request(
    sender: &str,
    sequence_number: u64,
    expiration_secs: i64,
    payload: Value,
) -> Value {
    json!({
        "sender": sender,
        "sequence_number": sequence_number.to_string(),
        "max_gas_amount": MAX_GAS_AMOUNT.to_string(),
        "gas_unit_price": GAS_UNIT_PRICE.to_string(),
        "expiration_timestamp_secs": expiration_secs.to_string(),
        "payload": payload,
    })
}

/// `send_coin_from<USDT>(dst_chain_id, dst_receiver, amount_ld, native_fee,
/// zro_fee, unwrap, adapter_params, msglib_params)`
fn bridge_payload(
    hub: &HubChain,
    destination: &Chain,
    recipient: Address,
    amount: U256,
    fee_octas: u64,
) -> Value {
    json!({
        "type": "entry_function_payload",
        "function": hub.bridge_function,
        "type_arguments": [hub.stable.address.clone().unwrap_or_default()],
        "arguments": [
            destination.lz_chain_id,
            format!("0x{}", hex::encode(address_to_bytes32(recipient))),
            amount.to_string(),
            fee_octas.to_string(),
            "0",
            false,
            BRIDGE_OUT_ADAPTER_PARAMS,
            "0x",
        ],
    })
}

/// `Some(success)` once committed, `None` while pending
fn transaction_outcome(body: &Value) -> Option<bool> {
    if body.get("type").and_then(|t| t.as_str()) == Some("pending_transaction") {
        return None;
    }
    body.get("success").and_then(|s| s.as_bool())
}

fn is_missing_coin_store(message: &str) -> bool {
    message.contains("ECOIN_STORE_NOT_PUBLISHED") || message.contains("resource_not_found")
}

/// View functions return `["<u64 as string>"]`
fn parse_view_u64(body: &Value) -> Result<U256, BotError> {
    body.get(0)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .map(U256::from)
        .ok_or_else(|| BotError::Rpc(format!("unexpected view response: {}", body)))
}
