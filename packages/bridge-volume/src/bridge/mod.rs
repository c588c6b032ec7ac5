//! The two legs of a bridge cycle
//!
//! Every transfer is routed EVM -> hub -> EVM. [`bridge_to_hub`] moves the
//! wallet's stablecoin from an EVM chain into the hub, [`bridge_from_hub`]
//! sends it back out to a randomly chosen bridge chain.

mod from_hub;
mod to_hub;

pub use from_hub::bridge_from_hub;
pub use to_hub::bridge_to_hub;

use alloy::primitives::U256;
use tracing::{debug, info};

use crate::balance::{poll_until_balance_changes, read_with_retry};
use crate::context::BotContext;
use crate::error::BotError;
use crate::evm::EvmAccount;
use crate::funding::FundingPurpose;
use crate::units::from_token_units;

/// Top up native gas on the account's chain if it is below the configured minimum.
pub async fn ensure_evm_gas(ctx: &BotContext, account: &dyn EvmAccount) -> Result<(), BotError> {
    let chain = account.chain();
    let minimum = ctx.config.funding.min_gas_for(&chain.name).ok_or_else(|| {
        BotError::Configuration(format!("no minimum gas balance for {}", chain.name))
    })?;

    let balance = read_with_retry(ctx.sleeper(), "native", || account.native_balance()).await;
    let human = from_token_units(balance, chain.native.decimals);
    if human >= minimum {
        return Ok(());
    }

    debug!(chain = %chain.name, balance = human, minimum, "Native balance below minimum");

    top_up_evm_gas(ctx, account, balance).await
}

/// Withdraw gas for the account's chain and wait until `current_balance` changes.
pub async fn top_up_evm_gas(
    ctx: &BotContext,
    account: &dyn EvmAccount,
    current_balance: U256,
) -> Result<(), BotError> {
    let chain = account.chain();
    info!(
        address = %account.address(),
        chain = %chain.name,
        balance = from_token_units(current_balance, chain.native.decimals),
        "Withdrawing native gas"
    );
    ctx.funding
        .withdraw(
            &chain.native.ticker,
            &chain.name,
            &account.address().to_string(),
            FundingPurpose::Gas,
        )
        .await?;

    poll_until_balance_changes(current_balance, ctx.sleeper(), "native", || {
        account.native_balance()
    })
    .await;
    Ok(())
}
