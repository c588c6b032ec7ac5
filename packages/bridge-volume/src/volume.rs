//! Volume orchestrator
//!
//! Drives one wallet through repeated EVM -> hub -> EVM bridge cycles until
//! the accumulated volume reaches its target, then sends the stablecoin to
//! the wallet's custodial deposit address.
//!
//! ```text
//! Bootstrapping -> [TopUpStable] -> BridgingOut -> Cooldown(Out) -> BridgingBack
//!      -> Cooldown(Back) -> BridgingOut ... -> Depositing -> Done
//! ```

use std::fmt;

use alloy::primitives::{Address, U256};
use tracing::{info, warn};

use crate::accounts::Accounts;
use crate::balance::{poll_until_balance_changes, read_with_retry, wait_for_minimum};
use crate::bridge::{bridge_from_hub, bridge_to_hub, top_up_evm_gas};
use crate::chains::Chain;
use crate::context::BotContext;
use crate::error::BotError;
use crate::funding::FundingPurpose;
use crate::retry::{RetryAction, RetryContext, RetryPolicy};
use crate::units::{from_token_units, to_token_units};

/// Prefix of progress lines for completed steps
pub const PASS: &str = "✅";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    /// After bridging into the hub
    Out,
    /// After bridging back to an EVM chain
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Bootstrapping,
    TopUpStable,
    BridgingOut,
    Cooldown(Leg),
    BridgingBack,
    Depositing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Bootstrapping => write!(f, "bootstrapping"),
            Stage::TopUpStable => write!(f, "top-up-stable"),
            Stage::BridgingOut => write!(f, "bridging-out"),
            Stage::Cooldown(Leg::Out) => write!(f, "cooldown-out"),
            Stage::Cooldown(Leg::Back) => write!(f, "cooldown-back"),
            Stage::BridgingBack => write!(f, "bridging-back"),
            Stage::Depositing => write!(f, "depositing"),
            Stage::Done => write!(f, "done"),
        }
    }
}

/// Transient per-wallet progress
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub accumulated_volume: u64,
    pub target_volume: u64,
    pub current_chain: Chain,
    pub cycles: u32,
}

/// Volume credited for one full cycle moving `amount` tokens each way
pub fn cycle_volume(amount: f64) -> u64 {
    (amount.round().max(0.0) as u64) * 2
}

/// One wallet's run
pub struct VolumeRun<'a> {
    ctx: &'a BotContext,
    accounts: &'a dyn Accounts,
    deposit_address: Address,
    stage: Stage,
    state: RunState,
    /// Stable balance seen while bootstrapping, the top-up waits for it to change
    initial_stable: U256,
    /// Amount moved by the current cycle's out-leg
    leg_amount: f64,
    messages: Vec<String>,
}

impl<'a> VolumeRun<'a> {
    /// Start a run on a random bridge chain with an explicit volume target.
    pub fn new(
        ctx: &'a BotContext,
        accounts: &'a dyn Accounts,
        deposit_address: Address,
        target_volume: u64,
    ) -> Self {
        let current_chain = ctx
            .registry
            .random_bridge_chain(&mut rand::thread_rng())
            .clone();
        Self {
            ctx,
            accounts,
            deposit_address,
            stage: Stage::Bootstrapping,
            state: RunState {
                accumulated_volume: 0,
                target_volume,
                current_chain,
                cycles: 0,
            },
            initial_stable: U256::ZERO,
            leg_amount: 0.0,
            messages: Vec::new(),
        }
    }

    /// Start a run with a target drawn from the configured range.
    pub fn with_random_target(
        ctx: &'a BotContext,
        accounts: &'a dyn Accounts,
        deposit_address: Address,
    ) -> Self {
        let target = ctx.config.volume.target_volume_usd.sample();
        Self::new(ctx, accounts, deposit_address, target)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Progress lines so far, kept even when the run fails
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Drive the state machine until the deposit is confirmed.
    pub async fn run(&mut self) -> Result<RunState, BotError> {
        while self.stage != Stage::Done {
            self.step().await?;
        }
        Ok(self.state.clone())
    }

    /// Execute the current stage and move to the next one.
    pub async fn step(&mut self) -> Result<Stage, BotError> {
        let next = match self.stage {
            Stage::Bootstrapping => self.bootstrap().await?,
            Stage::TopUpStable => self.top_up_stable().await?,
            Stage::BridgingOut => {
                let chain = self.state.current_chain.clone();
                self.leg_amount = bridge_to_hub(self.ctx, self.accounts, &chain).await?;
                self.messages
                    .push(format!("{} bridge {} -> {}", PASS, chain.name, self.ctx.registry.hub().name));
                Stage::Cooldown(Leg::Out)
            }
            Stage::Cooldown(leg) => {
                let delay = self.ctx.config.volume.sleep_between_bridges_secs.delay();
                info!(stage = %self.stage, wait_secs = delay.as_secs(), "Sleeping between bridges");
                self.ctx.sleeper().sleep(delay).await;
                match leg {
                    Leg::Out => Stage::BridgingBack,
                    Leg::Back if self.state.accumulated_volume < self.state.target_volume => {
                        Stage::BridgingOut
                    }
                    Leg::Back => Stage::Depositing,
                }
            }
            Stage::BridgingBack => {
                let destination = bridge_from_hub(self.ctx, self.accounts).await?;
                self.messages.push(format!(
                    "{} bridge {} -> {}",
                    PASS,
                    self.ctx.registry.hub().name,
                    destination.name
                ));
                self.state.accumulated_volume += cycle_volume(self.leg_amount);
                self.state.cycles += 1;
                self.state.current_chain = destination;
                info!(
                    cycle = self.state.cycles,
                    volume = self.state.accumulated_volume,
                    target = self.state.target_volume,
                    chain = %self.state.current_chain.name,
                    "Cycle complete"
                );
                Stage::Cooldown(Leg::Back)
            }
            Stage::Depositing => {
                self.deposit_to_custodial().await?;
                self.messages.push(format!(
                    "{} send to CEX - {}\nwallet completed {} USDT volume",
                    PASS, self.deposit_address, self.state.accumulated_volume
                ));
                Stage::Done
            }
            Stage::Done => Stage::Done,
        };

        self.stage = next;
        Ok(next)
    }

    async fn bootstrap(&mut self) -> Result<Stage, BotError> {
        let chain = &self.state.current_chain;
        let evm = self.accounts.evm(chain)?;
        let hub = self.accounts.hub();

        self.messages.push(evm.address().to_string());
        info!(
            evm = %evm.address(),
            hub = %hub.address(),
            deposit = %self.deposit_address,
            chain = %chain.name,
            target = self.state.target_volume,
            "Starting wallet"
        );

        let balance = read_with_retry(self.ctx.sleeper(), "stable", || {
            evm.token_balance(&chain.stable)
        })
        .await;
        self.initial_stable = balance;

        let human = from_token_units(balance, chain.stable.decimals);
        let threshold = self.ctx.config.funding.stable_withdraw_usd.min;
        self.messages
            .push(format!("will complete {} USDT volume", self.state.target_volume));

        if human < threshold {
            Ok(Stage::TopUpStable)
        } else {
            Ok(Stage::BridgingOut)
        }
    }

    /// Withdraw the working stablecoin balance and wait for it to land.
    ///
    /// Only exchange rejections are retried; anything else may have left a
    /// withdrawal in flight.
    async fn top_up_stable(&mut self) -> Result<Stage, BotError> {
        let chain = self.state.current_chain.clone();
        let evm = self.accounts.evm(&chain)?;
        let address = evm.address().to_string();
        let mut retry = RetryContext::new(RetryPolicy::exchange_withdraw());

        loop {
            match self
                .ctx
                .funding
                .withdraw(&chain.stable.ticker, &chain.name, &address, FundingPurpose::Stable)
                .await
            {
                Ok(_) => break,
                Err(e @ BotError::WithdrawFailed { .. }) => match retry.record_failure(&e) {
                    RetryAction::RetryAfter(backoff) => {
                        warn!(error = %e, backoff_secs = backoff.as_secs(), "Stable withdrawal rejected, retrying");
                        self.ctx.sleeper().sleep(backoff).await;
                    }
                    RetryAction::GiveUp => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }

        let balance = poll_until_balance_changes(self.initial_stable, self.ctx.sleeper(), "stable", || {
            evm.token_balance(&chain.stable)
        })
        .await;

        let human = from_token_units(balance, chain.stable.decimals);
        info!(chain = %chain.name, balance = human, "Stable withdrawal landed");
        self.messages.push(format!(
            "{} withdraw {} success, balance {}",
            PASS, chain.stable.ticker, human
        ));
        Ok(Stage::BridgingOut)
    }

    /// Send the whole stablecoin balance on the current chain to the deposit address.
    async fn deposit_to_custodial(&mut self) -> Result<(), BotError> {
        let chain = self.state.current_chain.clone();
        let evm = self.accounts.evm(&chain)?;
        let minimum = to_token_units(self.ctx.config.volume.min_stable_balance, chain.stable.decimals);
        let mut retry = RetryContext::new(RetryPolicy::deposit());

        loop {
            let balance = wait_for_minimum(minimum, self.ctx.sleeper(), "stable", || {
                evm.token_balance(&chain.stable)
            })
            .await;

            info!(
                chain = %chain.name,
                amount = from_token_units(balance, chain.stable.decimals),
                to = %self.deposit_address,
                "Depositing to custodial address"
            );

            let error = match evm.transfer(&chain.stable, self.deposit_address, balance).await {
                Ok(tx_hash) => {
                    info!(chain = %chain.name, tx_hash = %tx_hash, "Deposit confirmed");
                    return Ok(());
                }
                Err(e) => e,
            };

            warn!(chain = %chain.name, error = %error, "Deposit failed");
            if error.is_insufficient_funds() {
                let native = read_with_retry(self.ctx.sleeper(), "native", || evm.native_balance()).await;
                top_up_evm_gas(self.ctx, evm.as_ref(), native).await?;
            }

            match retry.record_failure(&error) {
                RetryAction::RetryAfter(backoff) => self.ctx.sleeper().sleep(backoff).await,
                RetryAction::GiveUp => return Err(error),
            }
        }
    }
}
