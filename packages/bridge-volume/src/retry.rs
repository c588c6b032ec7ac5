//! Bounded retry with randomized backoff for transaction submission
//!
//! Balance polls and approvals retry forever and do not go through here;
//! bridge submissions and custodial deposits carry a hard attempt cap.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::BotError;
use crate::pacing::{RandomRange, Sleeper};

/// Attempt cap and jittered backoff for one kind of step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Backoff between attempts, in seconds
    pub backoff_secs: RandomRange<u64>,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, min_backoff_secs: u64, max_backoff_secs: u64) -> Self {
        Self {
            max_attempts,
            backoff_secs: RandomRange::new(min_backoff_secs, max_backoff_secs),
        }
    }

    /// Submission into the hub bridge contract on an EVM chain.
    pub const fn bridge_to_hub() -> Self {
        Self::new(5, 30, 100)
    }

    /// Hub-native bridge transaction back to an EVM chain.
    pub const fn bridge_from_hub() -> Self {
        Self::new(3, 10, 100)
    }

    /// Token transfer to the custodial deposit address.
    pub const fn deposit() -> Self {
        Self::new(3, 10, 30)
    }

    /// Re-issuing a rejected exchange withdrawal.
    pub const fn exchange_withdraw() -> Self {
        Self::new(3, 30, 60)
    }

    pub fn backoff(&self) -> Duration {
        self.backoff_secs.delay()
    }

    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Action to take after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryAction {
    RetryAfter(Duration),
    GiveUp,
}

/// Failure bookkeeping for one retried step
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub policy: RetryPolicy,
    /// Failed attempts so far
    pub attempt: u32,
    pub last_error: Option<BotError>,
}

impl RetryContext {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_error: None,
        }
    }

    /// Record a failure and decide what happens next.
    pub fn record_failure(&mut self, error: &BotError) -> RetryAction {
        self.attempt += 1;
        self.last_error = Some(error.clone());

        if error.is_fatal() || !self.policy.should_retry(self.attempt) {
            return RetryAction::GiveUp;
        }
        RetryAction::RetryAfter(self.policy.backoff())
    }
}

/// Run `operation` until it succeeds or the policy gives up.
///
/// The closure receives the zero-based attempt number.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    step: &str,
    mut operation: F,
) -> Result<T, BotError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BotError>>,
{
    let mut ctx = RetryContext::new(policy);

    loop {
        match operation(ctx.attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => match ctx.record_failure(&e) {
                RetryAction::RetryAfter(backoff) => {
                    warn!(
                        step,
                        attempt = ctx.attempt,
                        max = policy.max_attempts,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "Step failed, retrying after backoff"
                    );
                    sleeper.sleep(backoff).await;
                }
                RetryAction::GiveUp => {
                    debug!(step, attempts = ctx.attempt, "Giving up");
                    return Err(e);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Sleeper for Recorder {
        async fn sleep(&self, d: Duration) {
            self.0.lock().unwrap().push(d);
        }
    }

    #[test]
    fn test_context_gives_up_at_cap() {
        let mut ctx = RetryContext::new(RetryPolicy::new(3, 1, 2));
        let err = BotError::Rpc("boom".into());
        assert!(matches!(ctx.record_failure(&err), RetryAction::RetryAfter(_)));
        assert!(matches!(ctx.record_failure(&err), RetryAction::RetryAfter(_)));
        assert_eq!(ctx.record_failure(&err), RetryAction::GiveUp);
        assert_eq!(ctx.attempt, 3);
    }

    #[test]
    fn test_context_gives_up_on_fatal() {
        let mut ctx = RetryContext::new(RetryPolicy::bridge_to_hub());
        let action = ctx.record_failure(&BotError::UnknownChain("x".into()));
        assert_eq!(action, RetryAction::GiveUp);
    }

    #[test]
    fn test_backoff_within_policy() {
        let policy = RetryPolicy::bridge_to_hub();
        for _ in 0..200 {
            let d = policy.backoff();
            assert!(d >= Duration::from_secs(30) && d <= Duration::from_secs(100));
        }
    }

    #[tokio::test]
    async fn test_with_retry_counts_attempts() {
        let sleeper = Recorder::default();
        let mut calls = 0u32;
        let result: Result<(), BotError> =
            with_retry(RetryPolicy::new(5, 1, 1), &sleeper, "test", |_| {
                calls += 1;
                async { Err(BotError::Rpc("nope".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 5);
        // No sleep after the final failure
        assert_eq!(sleeper.0.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_with_retry_returns_first_success() {
        let sleeper = Recorder::default();
        let result = with_retry(RetryPolicy::new(5, 1, 1), &sleeper, "test", |attempt| async move {
            if attempt < 2 {
                Err(BotError::Rpc("flaky".into()))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(sleeper.0.lock().unwrap().len(), 2);
    }
}
