//! Retry policy with configurable backoff and jitter.
//!
//! [`decide`] is a pure function of the attempt count and the error, so the
//! policy is testable without network calls. [`with_retry`] drives an async
//! operation with it. Only errors that report themselves [`Retryable`] are
//! retried.

use crate::errors::{ScoringError, SourceError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the initial call.
    pub max_attempts: usize,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Delay before retry number `retry` (0-indexed), capped, without jitter.
    #[must_use]
    pub fn backoff_delay(&self, retry: usize) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff_strategy {
            BackoffStrategy::Exponential => {
                let exponent = u32::try_from(retry).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exponent))
            }
            BackoffStrategy::Linear => {
                base.saturating_mul(u64::try_from(retry).unwrap_or(u64::MAX).saturating_add(1))
            }
            BackoffStrategy::Constant => base,
        };

        Duration::from_millis(delay.min(max))
    }

    /// Applies the jitter strategy to a delay.
    #[must_use]
    pub fn jittered(&self, delay: Duration) -> Duration {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let jittered = match self.jitter_strategy {
            JitterStrategy::None => ms,
            JitterStrategy::Full => {
                if ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=ms)
                }
            }
            JitterStrategy::Equal => {
                let half = ms / 2;
                if half == 0 {
                    ms
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };
        Duration::from_millis(jittered)
    }
}

/// Errors that can say whether another attempt might succeed.
pub trait Retryable {
    /// Returns true if the failure is transient.
    fn is_retryable(&self) -> bool;
}

impl Retryable for ScoringError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

/// Decides what to do after `attempts` failed attempts ending in `error`.
#[must_use]
pub fn decide<E: Retryable>(config: &RetryConfig, attempts: usize, error: &E) -> RetryDecision {
    if !error.is_retryable() {
        return RetryDecision::NotRetryable;
    }
    if attempts >= config.max_attempts {
        return RetryDecision::GiveUp;
    }
    let delay = config.backoff_delay(attempts.saturating_sub(1));
    RetryDecision::Retry(config.jittered(delay))
}

/// The error that ended a retried operation.
#[derive(Debug, Clone)]
pub struct RetryFailure<E> {
    /// The last error observed.
    pub error: E,
    /// Attempts made, including the first.
    pub attempts: usize,
    /// True if the error was retryable but the budget ran out.
    pub exhausted: bool,
}

/// Executes an operation with retry logic.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    key: &str,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => match decide(config, attempts, &e) {
                RetryDecision::Retry(delay) => {
                    tracing::debug!(
                        key = %key,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    tracing::warn!(key = %key, attempts, error = %e, "Retry budget exhausted");
                    return Err(RetryFailure {
                        error: e,
                        attempts,
                        exhausted: true,
                    });
                }
                RetryDecision::NotRetryable => {
                    return Err(RetryFailure {
                        error: e,
                        attempts,
                        exhausted: false,
                    });
                }
            },
        }
    }
}
