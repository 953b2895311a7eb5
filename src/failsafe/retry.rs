//! Retry logic with exponential backoff

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::RetryConfig;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Whether retries are enabled
    pub enabled: bool,
    /// Maximum attempts, first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    /// Attempts actually allowed: at least one, exactly one when disabled
    #[must_use]
    pub fn attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Delay before the `retry`-th retry (1-based):
    /// `initial_backoff * multiplier^(retry-1)`, capped at `max_backoff`
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let max_ms = self.max_backoff.as_millis() as f64;
        let delay_ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= max_ms {
            return self.max_backoff;
        }
        Duration::from_millis(delay_ms.max(0.0).round() as u64)
    }

    /// Every delay this policy can incur, in order
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.attempts()).map(|retry| self.delay_for(retry)).collect()
    }

    /// Worst-case time spent sleeping between attempts
    #[must_use]
    pub fn max_total_delay(&self) -> Duration {
        self.delays().into_iter().sum()
    }
}

/// Outcome of [`retry_with_stats`]
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Final result: first success or last error
    pub result: Result<T, E>,
    /// Attempts made
    pub attempts: u32,
    /// Wall-clock time including backoff sleeps
    pub total_duration: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Whether an attempt succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Consume into the final result
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Execute a future with retry logic
///
/// The first attempt runs immediately. A failure is retried only when
/// `should_retry` accepts it and attempts remain; otherwise that exact
/// error is returned.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    name: &str,
    should_retry: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1u32;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(operation = name, attempts = attempt, "Succeeded after retries");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    debug!(operation = name, attempt, error = %e, "Error is not retryable");
                    return Err(e);
                }

                if attempt >= max_attempts {
                    warn!(
                        operation = name,
                        attempts = attempt,
                        error = %e,
                        "Max retry attempts reached"
                    );
                    return Err(e);
                }

                let delay = policy.delay_for(attempt);
                debug!(
                    operation = name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Retrying after backoff"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Like [`retry_with_backoff`], but always returns a structured outcome
pub async fn retry_with_stats<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    name: &str,
    should_retry: P,
    mut f: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    let result = retry_with_backoff(policy, name, should_retry, || {
        attempts += 1;
        f()
    })
    .await;

    RetryOutcome {
        result,
        attempts,
        total_duration: started.elapsed(),
    }
}
