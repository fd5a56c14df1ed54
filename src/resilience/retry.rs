//! # Retry Policy
//!
//! Bounded exponential backoff with jitter around a fallible async operation.
//!
//! `max_attempts` counts every invocation including the first. The delay slept
//! after failed attempt `n` is `min(initial_delay * multiplier^(n-1), max_delay)`
//! plus a uniformly random extra of up to 10% of that value.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::constants::system::MAX_JITTER_FRACTION;
use crate::resilience::RetryPolicyConfig;

/// Handed to the observer before each backoff sleep
#[derive(Debug)]
pub struct RetryEvent<'a, E> {
    /// The attempt that just failed (1-based)
    pub attempt: u32,
    /// How long the policy is about to wait
    pub delay: Duration,
    pub error: &'a E,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed
    #[error("Gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// The error was classified as not worth retrying
    #[error("Aborted after {attempts} attempts on a non-retryable error: {error}")]
    Aborted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Aborted { attempts, .. } => *attempts,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::Aborted { error, .. } => error,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::Aborted { error, .. } => error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryPolicyConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryPolicyConfig {
        &self.config
    }

    /// Backoff before the retry that follows failed attempt `attempt`, without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(exponent);
        let capped = scaled.min(self.config.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.config.max_delay)
    }

    /// `base_delay` plus up to 10% random jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter_fraction = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION);
        base + base.mul_f64(jitter_fraction)
    }

    /// Retry every error until attempts run out
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.call_with_observer(operation, |_| true, |_: RetryEvent<'_, E>| Ok(()))
            .await
    }

    /// Retry errors accepted by `should_retry`, notifying `before_retry` ahead of
    /// each backoff sleep. An observer error is logged and does not stop the retry.
    pub async fn call_with_observer<F, Fut, T, E, P, O>(
        &self,
        mut operation: F,
        should_retry: P,
        mut before_retry: O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
        O: FnMut(RetryEvent<'_, E>) -> anyhow::Result<()>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt = attempt, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !should_retry(&error) {
                debug!(attempt = attempt, error = %error, "Error is not retryable");
                return Err(RetryError::Aborted {
                    attempts: attempt,
                    error,
                });
            }

            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %error, "Retry attempts exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.delay_for_attempt(attempt);
            debug!(
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "🔁 Attempt failed, backing off before retry"
            );

            if let Err(observer_error) = before_retry(RetryEvent {
                attempt,
                delay,
                error: &error,
            }) {
                warn!(error = %observer_error, "Retry observer failed; continuing");
            }

            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryPolicyConfig::default())
    }
}
