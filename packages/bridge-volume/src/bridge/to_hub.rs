use std::str::FromStr;

use alloy::primitives::{B256, U256};
use tracing::info;

use super::ensure_evm_gas;
use crate::accounts::Accounts;
use crate::balance::{ensure_allowance, wait_for_minimum};
use crate::chains::Chain;
use crate::context::BotContext;
use crate::error::BotError;
use crate::evm::parse_address;
use crate::retry::{with_retry, RetryPolicy};
use crate::units::{from_token_units, to_token_units};

/// Bridge the wallet's whole stablecoin balance on `chain` into the hub.
///
/// Returns the bridged amount in whole tokens.
pub async fn bridge_to_hub(
    ctx: &BotContext,
    accounts: &dyn Accounts,
    chain: &Chain,
) -> Result<f64, BotError> {
    let evm = accounts.evm(chain)?;
    let hub = accounts.hub();
    let stable = &chain.stable;

    ensure_evm_gas(ctx, evm.as_ref()).await?;

    let minimum = to_token_units(ctx.config.volume.min_stable_balance, stable.decimals);
    let amount = wait_for_minimum(minimum, ctx.sleeper(), "stable", || {
        evm.token_balance(stable)
    })
    .await;

    let recipient = B256::from_str(hub.address())
        .map_err(|e| BotError::Configuration(format!("invalid hub address: {}", e)))?;
    let spender = parse_address(&chain.bridge_address)?;
    let airdrop = airdrop_octas(ctx).await;
    let human = from_token_units(amount, stable.decimals);

    info!(
        address = %evm.address(),
        from = %chain.name,
        amount = human,
        token = %stable.ticker,
        "Bridging to hub"
    );

    let max_multiplier = ctx.config.bridge.approval_multiplier_max;
    let sleeper = ctx.sleeper();
    let tx_hash = with_retry(RetryPolicy::bridge_to_hub(), sleeper, "bridge_to_hub", |_| {
        let evm = evm.clone();
        async move {
            ensure_allowance(evm.as_ref(), stable, spender, amount, max_multiplier, sleeper).await?;
            evm.bridge_to_hub(stable, recipient, amount, airdrop).await
        }
    })
    .await?;

    info!(from = %chain.name, tx_hash = %tx_hash, "Bridge to hub confirmed");
    Ok(human)
}

/// Hub gas to airdrop with the bridge message, in octas
async fn airdrop_octas(ctx: &BotContext) -> U256 {
    let usd = ctx.config.bridge.hub_airdrop_usd;
    if usd <= 0.0 {
        return U256::ZERO;
    }
    let native = &ctx.registry.hub().native;
    let tokens = ctx.funding.usd_to_tokens(&native.ticker, usd).await;
    to_token_units(tokens, native.decimals)
}
