use tracing::{info, warn};

use crate::accounts::Accounts;
use crate::balance::{poll_until_balance_changes, read_with_retry, wait_for_minimum};
use crate::chains::Chain;
use crate::context::BotContext;
use crate::error::BotError;
use crate::funding::FundingPurpose;
use crate::hub::HubAccount;
use crate::retry::{RetryAction, RetryContext, RetryPolicy};
use crate::units::{from_token_units, to_token_units};

/// Bridge the hub stablecoin balance back out to a random bridge chain.
///
/// Each failed attempt raises the native fee by the configured step and
/// draws a new destination. Returns the chain the funds were sent to.
pub async fn bridge_from_hub(ctx: &BotContext, accounts: &dyn Accounts) -> Result<Chain, BotError> {
    let hub_chain = ctx.registry.hub();
    let hub = accounts.hub();

    ensure_hub_gas(ctx, hub.as_ref()).await?;

    let stable = &hub_chain.stable;
    let minimum = to_token_units(ctx.config.volume.min_stable_balance, stable.decimals);
    let amount = wait_for_minimum(minimum, ctx.sleeper(), "hub stable", || {
        hub.coin_balance(stable)
    })
    .await;

    let mut destination = pick_destination(ctx);
    let mut fee = ctx.config.bridge.hub_bridge_fee_octas;
    let mut retry = RetryContext::new(RetryPolicy::bridge_from_hub());

    info!(
        address = %hub.address(),
        amount = from_token_units(amount, stable.decimals),
        to = %destination.name,
        "Bridging from hub"
    );

    loop {
        let recipient = accounts.evm(&destination)?.address();
        match hub.send_to_evm(&destination, recipient, amount, fee).await {
            Ok(tx_hash) => {
                info!(to = %destination.name, tx_hash = %tx_hash, "Bridge from hub confirmed");
                return Ok(destination);
            }
            Err(e) => match retry.record_failure(&e) {
                RetryAction::RetryAfter(backoff) => {
                    destination = pick_destination(ctx);
                    fee += ctx.config.bridge.hub_bridge_fee_step_octas;
                    warn!(
                        attempt = retry.attempt,
                        error = %e,
                        next_destination = %destination.name,
                        next_fee_octas = fee,
                        backoff_secs = backoff.as_secs(),
                        "Hub bridge failed, retrying"
                    );
                    ctx.sleeper().sleep(backoff).await;
                }
                RetryAction::GiveUp => return Err(e),
            },
        }
    }
}

fn pick_destination(ctx: &BotContext) -> Chain {
    ctx.registry
        .random_bridge_chain(&mut rand::thread_rng())
        .clone()
}

async fn ensure_hub_gas(ctx: &BotContext, hub: &dyn HubAccount) -> Result<(), BotError> {
    let hub_chain = ctx.registry.hub();
    let native = &hub_chain.native;
    let minimum = ctx.config.funding.min_gas_for(&hub_chain.name).ok_or_else(|| {
        BotError::Configuration(format!("no minimum gas balance for {}", hub_chain.name))
    })?;

    let balance = read_with_retry(ctx.sleeper(), "hub native", || hub.coin_balance(native)).await;
    let human = from_token_units(balance, native.decimals);
    if human >= minimum {
        return Ok(());
    }

    info!(address = %hub.address(), balance = human, minimum, "Hub gas low, withdrawing");
    ctx.funding
        .withdraw(&native.ticker, &hub_chain.name, hub.address(), FundingPurpose::Gas)
        .await?;

    poll_until_balance_changes(balance, ctx.sleeper(), "hub native", || {
        hub.coin_balance(native)
    })
    .await;
    Ok(())
}
