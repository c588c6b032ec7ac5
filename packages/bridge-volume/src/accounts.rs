//! Per-wallet chain accounts
//!
//! A wallet owns one EVM key (valid on every bridge chain) and one hub key.
//! [`Accounts`] hands out chain-bound views of them.

use std::sync::Arc;

use crate::chains::{Chain, HubChain};
use crate::error::BotError;
use crate::evm::{parse_signer, AlloyEvmAccount, EvmAccount};
use crate::hub::{AptosAccount, HubAccount};
use crate::redact::Redacted;

pub trait Accounts: Send + Sync {
    /// The wallet's EVM account on `chain`
    fn evm(&self, chain: &Chain) -> Result<Arc<dyn EvmAccount>, BotError>;

    fn hub(&self) -> Arc<dyn HubAccount>;
}

/// Accounts backed by live RPC clients
pub struct LiveAccounts {
    evm_key: Redacted<String>,
    hub: Arc<AptosAccount>,
}

impl LiveAccounts {
    pub fn new(evm_key: &Redacted<String>, hub_key: &Redacted<String>, hub: HubChain) -> Result<Self, BotError> {
        // Fail fast on a malformed key instead of on the first chain call
        parse_signer(evm_key.expose())?;
        let hub = Arc::new(AptosAccount::new(hub, hub_key.expose())?);
        Ok(Self {
            evm_key: evm_key.clone(),
            hub,
        })
    }
}

impl Accounts for LiveAccounts {
    fn evm(&self, chain: &Chain) -> Result<Arc<dyn EvmAccount>, BotError> {
        Ok(Arc::new(AlloyEvmAccount::new(chain.clone(), self.evm_key.expose())?))
    }

    fn hub(&self) -> Arc<dyn HubAccount> {
        self.hub.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{avalanche, bsc, DEFAULT_APTOS_REST_URL};

    const EVM_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const HUB_KEY: &str = "0x9bf49a6a0755f953811fce125f2683d50429c3bb49e074147e0089a52eae155f";

    #[test]
    fn test_same_evm_address_on_every_chain() {
        let accounts = LiveAccounts::new(
            &EVM_KEY.to_string().into(),
            &HUB_KEY.to_string().into(),
            HubChain::aptos(DEFAULT_APTOS_REST_URL),
        )
        .unwrap();

        let a = accounts.evm(&bsc("http://a")).unwrap();
        let b = accounts.evm(&avalanche("http://b")).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(b.chain().name, "Avalanche");
        assert!(accounts.hub().address().starts_with("0x"));
    }

    #[test]
    fn test_bad_keys_rejected() {
        let hub = HubChain::aptos(DEFAULT_APTOS_REST_URL);
        assert!(LiveAccounts::new(&"nope".to_string().into(), &HUB_KEY.to_string().into(), hub.clone()).is_err());
        assert!(LiveAccounts::new(&EVM_KEY.to_string().into(), &"nope".to_string().into(), hub).is_err());
    }
}
