//! Randomized amounts and delays, plus the sleep abstraction every wait goes through.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Uniform integer in `[min, max]`.
pub fn random_int(min: u64, max: u64) -> u64 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    rand::thread_rng().gen_range(lo..=hi)
}

/// Uniform float in `[min, max)`. A degenerate or non-finite range returns `min`.
pub fn random_float(min: f64, max: f64) -> f64 {
    let span = max - min;
    if !span.is_finite() || span <= 0.0 {
        return min;
    }
    rand::thread_rng().gen_range(min..max)
}

/// Random whole-second delay in `[min_secs, max_secs]`.
pub fn random_delay(min_secs: u64, max_secs: u64) -> Duration {
    Duration::from_secs(random_int(min_secs, max_secs))
}

/// Closed configuration range, written as `min,max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomRange<T> {
    pub min: T,
    pub max: T,
}

impl<T> RandomRange<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl RandomRange<u64> {
    pub fn sample(&self) -> u64 {
        random_int(self.min, self.max)
    }

    /// Interpret the range as seconds and draw a delay.
    pub fn delay(&self) -> Duration {
        random_delay(self.min, self.max)
    }
}

impl RandomRange<f64> {
    pub fn sample(&self) -> f64 {
        random_float(self.min, self.max)
    }
}

impl<T: fmt::Display> fmt::Display for RandomRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

impl<T> FromStr for RandomRange<T>
where
    T: FromStr + PartialOrd,
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once(',')
            .ok_or_else(|| format!("expected 'min,max', got '{}'", s))?;
        let min: T = min
            .trim()
            .parse()
            .map_err(|_| format!("invalid lower bound in '{}'", s))?;
        let max: T = max
            .trim()
            .parse()
            .map_err(|_| format!("invalid upper bound in '{}'", s))?;
        if min > max {
            return Err(format!("lower bound exceeds upper bound in '{}'", s));
        }
        Ok(Self { min, max })
    }
}

/// Suspension point for every poll loop, backoff and cooldown.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
