//! Balance polling and allowance management
//!
//! These loops wait on external, eventually consistent state (exchange
//! withdrawals landing, bridged funds arriving) and have no attempt cap.
//! An operator has to intervene if the funds never show up.

use std::future::Future;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use tracing::{debug, info, warn};

use crate::chains::TokenDescriptor;
use crate::error::BotError;
use crate::evm::EvmAccount;
use crate::pacing::{random_float, RandomRange, Sleeper};
use crate::units::{from_token_units, scale_amount};

/// Jitter between balance samples, in seconds
pub const POLL_JITTER_SECS: RandomRange<u64> = RandomRange::new(30, 100);

/// Fixed wait after a failed balance read
pub const READ_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Backoff between failed approval submissions, in seconds
pub const APPROVE_BACKOFF_SECS: RandomRange<u64> = RandomRange::new(5, 10);

/// Read a balance, retrying failed reads after [`READ_RETRY_DELAY`].
pub async fn read_with_retry<F, Fut>(sleeper: &dyn Sleeper, label: &str, mut sample: F) -> U256
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<U256, BotError>>,
{
    loop {
        match sample().await {
            Ok(balance) => return balance,
            Err(e) => {
                warn!(label, error = %e, "Balance read failed, retrying");
                sleeper.sleep(READ_RETRY_DELAY).await;
            }
        }
    }
}

/// Sample until the balance differs from `initial` and return the new value.
pub async fn poll_until_balance_changes<F, Fut>(
    initial: U256,
    sleeper: &dyn Sleeper,
    label: &str,
    mut sample: F,
) -> U256
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<U256, BotError>>,
{
    loop {
        let current = read_with_retry(sleeper, label, &mut sample).await;
        if current != initial {
            info!(label, old = %initial, new = %current, "Balance changed");
            return current;
        }

        let delay = POLL_JITTER_SECS.delay();
        debug!(label, balance = %current, wait_secs = delay.as_secs(), "Waiting for balance change");
        sleeper.sleep(delay).await;
    }
}

/// Sample until the balance is at least `minimum` and return it.
pub async fn wait_for_minimum<F, Fut>(
    minimum: U256,
    sleeper: &dyn Sleeper,
    label: &str,
    mut sample: F,
) -> U256
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<U256, BotError>>,
{
    loop {
        let current = read_with_retry(sleeper, label, &mut sample).await;
        if current >= minimum {
            return current;
        }

        let delay = POLL_JITTER_SECS.delay();
        info!(
            label,
            balance = %current,
            minimum = %minimum,
            wait_secs = delay.as_secs(),
            "Balance below minimum, waiting"
        );
        sleeper.sleep(delay).await;
    }
}

/// Make sure `spender` may pull `amount` of `token`.
///
/// The approval is sized to a random 1x..`max_multiplier`x of `amount` and
/// resubmitted until it confirms.
pub async fn ensure_allowance(
    account: &dyn EvmAccount,
    token: &TokenDescriptor,
    spender: Address,
    amount: U256,
    max_multiplier: f64,
    sleeper: &dyn Sleeper,
) -> Result<(), BotError> {
    let allowance = account.allowance(token, spender).await?;
    if allowance >= amount {
        debug!(token = %token.ticker, allowance = %allowance, "Allowance sufficient");
        return Ok(());
    }

    loop {
        let multiplier = random_float(1.0, max_multiplier);
        let approve_amount = scale_amount(amount, multiplier).max(amount);

        info!(
            chain = %account.chain().name,
            token = %token.ticker,
            amount = from_token_units(approve_amount, token.decimals),
            "Approving"
        );

        match account.approve(token, spender, approve_amount).await {
            Ok(tx_hash) => {
                info!(tx_hash = %tx_hash, "Approve confirmed");
                return Ok(());
            }
            Err(e) => {
                let delay = APPROVE_BACKOFF_SECS.delay();
                warn!(error = %e, wait_secs = delay.as_secs(), "Approve failed, retrying");
                sleeper.sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Sleeper for Recorder {
        async fn sleep(&self, d: Duration) {
            self.0.lock().unwrap().push(d);
        }
    }

    fn script(values: Vec<Result<u64, &'static str>>) -> Mutex<VecDeque<Result<U256, BotError>>> {
        Mutex::new(
            values
                .into_iter()
                .map(|v| v.map(U256::from).map_err(|e| BotError::Rpc(e.into())))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_poll_returns_first_changed_value() {
        let samples = script(vec![Ok(100), Ok(100), Ok(150)]);
        let sleeper = Recorder::default();

        let balance = poll_until_balance_changes(U256::from(100), &sleeper, "test", || {
            let next = samples.lock().unwrap().pop_front().unwrap();
            async move { next }
        })
        .await;

        assert_eq!(balance, U256::from(150));
        assert!(samples.lock().unwrap().is_empty());

        let sleeps = sleeper.0.lock().unwrap();
        assert_eq!(sleeps.len(), 2);
        for d in sleeps.iter() {
            assert!(*d >= Duration::from_secs(30) && *d <= Duration::from_secs(100));
        }
    }

    #[tokio::test]
    async fn test_poll_swallows_read_errors() {
        let samples = script(vec![Err("timeout"), Ok(100), Err("reset"), Ok(7)]);
        let sleeper = Recorder::default();

        let balance = poll_until_balance_changes(U256::from(100), &sleeper, "test", || {
            let next = samples.lock().unwrap().pop_front().unwrap();
            async move { next }
        })
        .await;

        assert_eq!(balance, U256::from(7));
        let sleeps = sleeper.0.lock().unwrap();
        assert_eq!(sleeps.len(), 3);
        assert_eq!(sleeps[0], READ_RETRY_DELAY);
        assert_eq!(sleeps[2], READ_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_wait_for_minimum() {
        let samples = script(vec![Ok(10), Ok(499), Ok(500)]);
        let sleeper = Recorder::default();

        let balance = wait_for_minimum(U256::from(500), &sleeper, "test", || {
            let next = samples.lock().unwrap().pop_front().unwrap();
            async move { next }
        })
        .await;

        assert_eq!(balance, U256::from(500));
        assert_eq!(sleeper.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_minimum_returns_immediately_when_funded() {
        let sleeper = Recorder::default();
        let balance = wait_for_minimum(U256::from(5), &sleeper, "test", || async {
            Ok(U256::from(9))
        })
        .await;
        assert_eq!(balance, U256::from(9));
        assert!(sleeper.0.lock().unwrap().is_empty());
    }
}
