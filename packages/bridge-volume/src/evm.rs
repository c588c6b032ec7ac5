//! EVM chain account
//!
//! [`EvmAccount`] is the capability the bridge legs and the deposit step use
//! on an EVM chain. [`AlloyEvmAccount`] implements it over HTTP JSON-RPC with
//! a local signer. Every submission waits for its receipt for at most
//! [`CONFIRMATION_TIMEOUT`].

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use alloy::network::{EthereumWallet, ReceiptResponse};
use alloy::primitives::{Address, TxHash, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::chains::{Chain, TokenDescriptor, TokenKind};
use crate::contracts::{adapter_params, call_params, AptosBridge, IERC20};
use crate::error::BotError;

pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait EvmAccount: Send + Sync {
    fn address(&self) -> Address;

    fn chain(&self) -> &Chain;

    async fn native_balance(&self) -> Result<U256, BotError>;

    /// Balance of `token`; native descriptors read the account balance.
    async fn token_balance(&self, token: &TokenDescriptor) -> Result<U256, BotError>;

    async fn allowance(&self, token: &TokenDescriptor, spender: Address)
        -> Result<U256, BotError>;

    async fn approve(
        &self,
        token: &TokenDescriptor,
        spender: Address,
        amount: U256,
    ) -> Result<String, BotError>;

    /// Quote the messaging fee and send `amount` of `token` to `recipient` on the hub.
    async fn bridge_to_hub(
        &self,
        token: &TokenDescriptor,
        recipient: B256,
        amount: U256,
        airdrop: U256,
    ) -> Result<String, BotError>;

    async fn transfer(
        &self,
        token: &TokenDescriptor,
        to: Address,
        amount: U256,
    ) -> Result<String, BotError>;
}

/// Live account backed by an alloy HTTP provider
pub struct AlloyEvmAccount {
    chain: Chain,
    signer: PrivateKeySigner,
}

impl AlloyEvmAccount {
    pub fn new(chain: Chain, private_key: &str) -> Result<Self, BotError> {
        let signer = parse_signer(private_key)?;
        Ok(Self { chain, signer })
    }

    fn rpc_url(&self) -> Result<Url, BotError> {
        self.chain
            .rpc_url
            .parse()
            .map_err(|e| BotError::Configuration(format!("invalid RPC URL for {}: {}", self.chain.name, e)))
    }

    /// Randomized legacy gas price in wei, if the chain pins one
    fn gas_price(&self) -> Option<u128> {
        self.chain
            .gas_price_gwei
            .map(|range| (range.sample() * 1e9) as u128)
    }

    fn bridge_address(&self) -> Result<Address, BotError> {
        parse_address(&self.chain.bridge_address)
    }
}

#[async_trait]
impl EvmAccount for AlloyEvmAccount {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn chain(&self) -> &Chain {
        &self.chain
    }

    async fn native_balance(&self) -> Result<U256, BotError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url()?);
        provider
            .get_balance(self.address())
            .await
            .map_err(|e| BotError::from_rpc(e.to_string()))
    }

    async fn token_balance(&self, token: &TokenDescriptor) -> Result<U256, BotError> {
        if token.kind == TokenKind::Native {
            return self.native_balance().await;
        }

        let provider = ProviderBuilder::new().on_http(self.rpc_url()?);
        let contract = IERC20::new(token_address(token)?, &provider);
        let balance = contract
            .balanceOf(self.address())
            .call()
            .await
            .map_err(|e| BotError::from_rpc(e.to_string()))?;
        Ok(balance._0)
    }

    async fn allowance(
        &self,
        token: &TokenDescriptor,
        spender: Address,
    ) -> Result<U256, BotError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url()?);
        let contract = IERC20::new(token_address(token)?, &provider);
        let allowance = contract
            .allowance(self.address(), spender)
            .call()
            .await
            .map_err(|e| BotError::from_rpc(e.to_string()))?;
        Ok(allowance._0)
    }

    async fn approve(
        &self,
        token: &TokenDescriptor,
        spender: Address,
        amount: U256,
    ) -> Result<String, BotError> {
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.rpc_url()?);

        let contract = IERC20::new(token_address(token)?, &provider);
        let mut call = contract.approve(spender, amount);
        if let Some(gas_price) = self.gas_price() {
            call = call.gas_price(gas_price);
        }

        debug!(chain = %self.chain.name, token = %token.ticker, spender = %spender, amount = %amount, "Submitting approve");

        let pending_tx = call
            .send()
            .await
            .map_err(|e| BotError::from_rpc(format!("approve: {}", e)))?;
        let tx_hash = *pending_tx.tx_hash();
        info!(chain = %self.chain.name, tx_hash = %tx_hash, "Approve transaction sent");

        confirm(tx_hash, pending_tx.get_receipt()).await
    }

    async fn bridge_to_hub(
        &self,
        token: &TokenDescriptor,
        recipient: B256,
        amount: U256,
        airdrop: U256,
    ) -> Result<String, BotError> {
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.rpc_url()?);

        let contract = AptosBridge::new(self.bridge_address()?, &provider);
        let adapter = adapter_params(airdrop, self.address());

        let quote = contract
            .quoteForSend(call_params(self.address()), adapter.clone())
            .call()
            .await
            .map_err(|e| BotError::from_rpc(format!("quoteForSend: {}", e)))?;

        debug!(
            chain = %self.chain.name,
            amount = %amount,
            native_fee = %quote.nativeFee,
            "Submitting sendToAptos"
        );

        let mut call = contract
            .sendToAptos(
                token_address(token)?,
                recipient,
                amount,
                call_params(self.address()),
                adapter,
            )
            .value(quote.nativeFee);
        if let Some(gas_price) = self.gas_price() {
            call = call.gas_price(gas_price);
        }

        let pending_tx = call
            .send()
            .await
            .map_err(|e| BotError::from_rpc(format!("sendToAptos: {}", e)))?;
        let tx_hash = *pending_tx.tx_hash();
        info!(
            chain = %self.chain.name,
            explorer = %self.chain.explorer_link(&format!("0x{:x}", tx_hash)),
            "Bridge transaction sent"
        );

        confirm(tx_hash, pending_tx.get_receipt()).await
    }

    async fn transfer(
        &self,
        token: &TokenDescriptor,
        to: Address,
        amount: U256,
    ) -> Result<String, BotError> {
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.rpc_url()?);

        let contract = IERC20::new(token_address(token)?, &provider);
        let mut call = contract.transfer(to, amount);
        if let Some(gas_price) = self.gas_price() {
            call = call.gas_price(gas_price);
        }

        let pending_tx = call
            .send()
            .await
            .map_err(|e| BotError::from_rpc(format!("transfer: {}", e)))?;
        let tx_hash = *pending_tx.tx_hash();
        info!(
            chain = %self.chain.name,
            to = %to,
            explorer = %self.chain.explorer_link(&format!("0x{:x}", tx_hash)),
            "Transfer transaction sent"
        );

        confirm(tx_hash, pending_tx.get_receipt()).await
    }
}

/// Wait for a receipt within [`CONFIRMATION_TIMEOUT`] and check its status.
async fn confirm<F, R, E>(tx_hash: TxHash, receipt: F) -> Result<String, BotError>
where
    F: Future<Output = Result<R, E>>,
    R: ReceiptResponse,
    E: std::fmt::Display,
{
    let hash = format!("0x{:x}", tx_hash);
    let receipt = tokio::time::timeout(CONFIRMATION_TIMEOUT, receipt)
        .await
        .map_err(|_| BotError::TransactionTimeout {
            tx_hash: hash.clone(),
            timeout_secs: CONFIRMATION_TIMEOUT.as_secs(),
        })?
        .map_err(|e| BotError::from_rpc(format!("receipt for {}: {}", hash, e)))?;

    if !receipt.status() {
        return Err(BotError::TransactionReverted { tx_hash: hash });
    }
    Ok(hash)
}

pub fn parse_signer(private_key: &str) -> Result<PrivateKeySigner, BotError> {
    private_key
        .trim()
        .parse()
        .map_err(|_| BotError::Configuration("invalid EVM private key".to_string()))
}

pub fn parse_address(address: &str) -> Result<Address, BotError> {
    Address::from_str(address.trim())
        .map_err(|e| BotError::Configuration(format!("invalid address '{}': {}", address, e)))
}

fn token_address(token: &TokenDescriptor) -> Result<Address, BotError> {
    match (&token.kind, &token.address) {
        (TokenKind::Erc20, Some(address)) => parse_address(address),
        _ => Err(BotError::Configuration(format!(
            "{} is not an ERC20 token",
            token.ticker
        ))),
    }
}

/// Left-pad an EVM address into a 32-byte LayerZero receiver.
pub fn address_to_bytes32(address: Address) -> B256 {
    address.into_word()
}
