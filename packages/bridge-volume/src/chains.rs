//! Chain Registry
//!
//! Static descriptions of the EVM chains wallets bridge through and the hub
//! chain every transfer is routed via. Built once at startup and shared
//! read-only by every wallet run.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::BotError;
use crate::pacing::RandomRange;

/// LayerZero USDT coin published by the Aptos token bridge
pub const APTOS_BRIDGE_ACCOUNT: &str =
    "0xf22bede237a07e121b56d91a491eb7bcdfd1f5907926a9e58338f964a01b17fa";
pub const APTOS_NATIVE_COIN: &str = "0x1::aptos_coin::AptosCoin";
pub const DEFAULT_APTOS_REST_URL: &str = "https://fullnode.mainnet.aptoslabs.com/v1";

/// How a token is addressed on its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Chain gas token, no contract
    Native,
    /// ERC20 contract
    Erc20,
    /// Aptos `0x1::coin` type tag
    AptosCoin,
}

/// Token descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub ticker: String,
    /// Contract address (EVM) or coin type tag (Aptos)
    pub address: Option<String>,
    pub decimals: u8,
    pub kind: TokenKind,
}

impl TokenDescriptor {
    pub fn native(ticker: &str, decimals: u8) -> Self {
        Self {
            ticker: ticker.to_string(),
            address: None,
            decimals,
            kind: TokenKind::Native,
        }
    }

    pub fn erc20(ticker: &str, address: &str, decimals: u8) -> Self {
        Self {
            ticker: ticker.to_string(),
            address: Some(address.to_string()),
            decimals,
            kind: TokenKind::Erc20,
        }
    }

    pub fn aptos_coin(ticker: &str, type_tag: &str, decimals: u8) -> Self {
        Self {
            ticker: ticker.to_string(),
            address: Some(type_tag.to_string()),
            decimals,
            kind: TokenKind::AptosCoin,
        }
    }
}

/// An EVM chain connected to the hub through the token bridge
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub name: String,
    pub rpc_url: String,
    /// Native EVM chain id
    pub chain_id: u64,
    /// LayerZero endpoint id
    pub lz_chain_id: u16,
    pub native: TokenDescriptor,
    pub stable: TokenDescriptor,
    /// Token bridge contract exposing `sendToAptos` / `quoteForSend`
    pub bridge_address: String,
    /// Explorer prefix, the tx hash is appended
    pub explorer_tx_url: String,
    /// Randomized legacy gas price in gwei; `None` uses the node estimate
    pub gas_price_gwei: Option<RandomRange<f64>>,
}

impl Chain {
    pub fn explorer_link(&self, tx_hash: &str) -> String {
        format!("{}{}", self.explorer_tx_url, tx_hash)
    }
}

/// The chain all transfers are routed through
#[derive(Debug, Clone, PartialEq)]
pub struct HubChain {
    pub name: String,
    pub rest_url: String,
    pub lz_chain_id: u16,
    pub native: TokenDescriptor,
    pub stable: TokenDescriptor,
    /// Fully qualified entry function used to bridge out of the hub
    pub bridge_function: String,
    pub explorer_tx_url: String,
}

impl HubChain {
    pub fn aptos(rest_url: &str) -> Self {
        Self {
            name: "Aptos".to_string(),
            rest_url: rest_url.trim_end_matches('/').to_string(),
            lz_chain_id: 108,
            native: TokenDescriptor::aptos_coin("APT", APTOS_NATIVE_COIN, 8),
            stable: TokenDescriptor::aptos_coin(
                "USDT",
                &format!("{}::asset::USDT", APTOS_BRIDGE_ACCOUNT),
                6,
            ),
            bridge_function: format!("{}::coin_bridge::send_coin_from", APTOS_BRIDGE_ACCOUNT),
            explorer_tx_url: "https://explorer.aptoslabs.com/txn/".to_string(),
        }
    }

    pub fn explorer_link(&self, tx_hash: &str) -> String {
        format!("{}{}", self.explorer_tx_url, tx_hash)
    }
}

pub fn bsc(rpc_url: &str) -> Chain {
    Chain {
        name: "BSC".to_string(),
        rpc_url: rpc_url.to_string(),
        chain_id: 56,
        lz_chain_id: 102,
        native: TokenDescriptor::native("BNB", 18),
        stable: TokenDescriptor::erc20("USDT", "0x55d398326f99059fF775485246999027B3197955", 18),
        bridge_address: "0x2762409Baa1804D94D8c0bCFF8400B78Bf915D5B".to_string(),
        explorer_tx_url: "https://bscscan.com/tx/".to_string(),
        gas_price_gwei: Some(RandomRange::new(1.0, 1.1)),
    }
}

pub fn avalanche(rpc_url: &str) -> Chain {
    Chain {
        name: "Avalanche".to_string(),
        rpc_url: rpc_url.to_string(),
        chain_id: 43114,
        lz_chain_id: 106,
        native: TokenDescriptor::native("AVAX", 18),
        stable: TokenDescriptor::erc20("USDT", "0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7", 6),
        bridge_address: "0xA5972EeE0C9B5bBb89a5B16D1d65f94c9EF25166".to_string(),
        explorer_tx_url: "https://snowtrace.io/tx/".to_string(),
        gas_price_gwei: None,
    }
}

/// Immutable lookup over the supported chains
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<Chain>,
    hub: HubChain,
}

impl ChainRegistry {
    pub fn new(chains: Vec<Chain>, hub: HubChain) -> Result<Self, BotError> {
        if chains.is_empty() {
            return Err(BotError::Configuration(
                "at least one bridge chain must be configured".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for chain in &chains {
            if !seen.insert(chain.chain_id) {
                return Err(BotError::Configuration(format!(
                    "duplicate chain id {} ({})",
                    chain.chain_id, chain.name
                )));
            }
        }

        Ok(Self { chains, hub })
    }

    /// Production registry. `rpc_overrides` is keyed by upper-cased chain name.
    pub fn mainnet(
        rpc_overrides: &HashMap<String, String>,
        hub_rest_url: &str,
    ) -> Result<Self, BotError> {
        let rpc = |name: &str, default: &str| {
            rpc_overrides
                .get(&name.to_uppercase())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Self::new(
            vec![
                bsc(&rpc("BSC", "https://rpc.ankr.com/bsc")),
                avalanche(&rpc("Avalanche", "https://rpc.ankr.com/avalanche")),
            ],
            HubChain::aptos(hub_rest_url),
        )
    }

    pub fn resolve_chain_by_id(&self, chain_id: u64) -> Result<&Chain, BotError> {
        self.chains
            .iter()
            .find(|c| c.chain_id == chain_id)
            .ok_or_else(|| BotError::UnknownChain(chain_id.to_string()))
    }

    pub fn resolve_chain_by_name(&self, name: &str) -> Result<&Chain, BotError> {
        self.chains
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| BotError::UnknownChain(name.to_string()))
    }

    pub fn list_bridge_chains(&self) -> &[Chain] {
        &self.chains
    }

    /// Uniformly pick a bridge chain.
    pub fn random_bridge_chain<R: Rng + ?Sized>(&self, rng: &mut R) -> &Chain {
        // `new` rejects an empty chain list
        let chains = self.list_bridge_chains();
        chains.choose(rng).unwrap_or(&chains[0])
    }

    pub fn hub(&self) -> &HubChain {
        &self.hub
    }

    /// Every network name the funding config may refer to
    pub fn network_names(&self) -> Vec<&str> {
        self.chains
            .iter()
            .map(|c| c.name.as_str())
            .chain(std::iter::once(self.hub.name.as_str()))
            .collect()
    }
}
