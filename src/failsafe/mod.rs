//! Failsafe mechanisms: circuit breaker, retry with backoff, retry predicates
//!
//! A [`Failsafe`] composes the two primitives the way every remote call in
//! the crate uses them: the breaker wraps a whole retry sequence, and each
//! attempt inside the sequence carries its own deadline.
//!
//! ```text
//! caller -> CircuitBreaker (admit / reject / trial)
//!        -> retry_with_backoff (attempt, sleep, attempt, ...)
//!        -> timeout(attempt_timeout, operation)
//! ```

mod circuit_breaker;
pub mod predicates;
mod registry;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitOpen, CircuitState};
pub use predicates::{Classify, NetworkCode};
pub use registry::CircuitBreakerRegistry;
pub use retry::{RetryOutcome, RetryPolicy, retry_with_backoff, retry_with_stats};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::FailsafeConfig;
use crate::{Error, Result};

/// Circuit breaker plus retry policy for one remote dependency
#[derive(Debug, Clone)]
pub struct Failsafe {
    /// Breaker shared with every other user of the same dependency
    pub circuit_breaker: Arc<CircuitBreaker>,
    /// Retry policy
    pub retry_policy: RetryPolicy,
    /// Deadline for each individual attempt
    pub attempt_timeout: Duration,
}

impl Failsafe {
    /// Create a failsafe for `name`, reusing the registry's breaker if one exists
    #[must_use]
    pub fn new(registry: &CircuitBreakerRegistry, name: &str, config: &FailsafeConfig) -> Self {
        Self {
            circuit_breaker: registry.get_with(name, &config.circuit_breaker),
            retry_policy: RetryPolicy::new(&config.retry),
            attempt_timeout: config.retry.attempt_timeout,
        }
    }

    /// Dependency name
    #[must_use]
    pub fn name(&self) -> &str {
        self.circuit_breaker.name()
    }

    /// Run `op` with retries inside the breaker
    pub async fn call<T, F, Fut, P>(&self, should_retry: P, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        self.circuit_breaker
            .execute(|| self.retrying(should_retry, op))
            .await
    }

    /// Run `op` with retries inside the breaker, degrading to `fallback`
    pub async fn call_with_fallback<T, F, Fut, P, Fb, FbFut>(
        &self,
        should_retry: P,
        op: F,
        fallback: Fb,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T>>,
    {
        self.circuit_breaker
            .execute_with_fallback(|| self.retrying(should_retry, op), fallback)
            .await
    }

    async fn retrying<T, F, Fut, P>(&self, should_retry: P, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let deadline = self.attempt_timeout;
        retry_with_backoff(&self.retry_policy, self.name(), should_retry, || {
            let attempt = op();
            async move {
                tokio::time::timeout(deadline, attempt)
                    .await
                    .unwrap_or_else(|_| Err(Error::Timeout(deadline)))
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::config::{CircuitBreakerConfig, RetryConfig};

    fn config() -> FailsafeConfig {
        FailsafeConfig {
            circuit_breaker: CircuitBreakerConfig {
                enabled: true,
                failure_threshold: 2,
                success_threshold: 1,
                reset_timeout: Duration::from_secs(60),
            },
            retry: RetryConfig {
                enabled: true,
                max_attempts: 3,
                initial_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(10),
                multiplier: 2.0,
                attempt_timeout: Duration::from_secs(30),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_invisible() {
        let registry = CircuitBreakerRegistry::default();
        let failsafe = Failsafe::new(&registry, "rag", &config());
        let calls = AtomicU32::new(0);

        let value = failsafe
            .call(predicates::standard, || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::from_status(502, "bad gateway"))
                } else {
                    Ok("answer")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(failsafe.circuit_breaker.stats().total_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_count_once_per_call() {
        let registry = CircuitBreakerRegistry::default();
        let failsafe = Failsafe::new(&registry, "rag", &config());
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let err = failsafe
                .call(predicates::standard, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Error::from_status(500, "down"))
                })
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Status { status: 500, .. }));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(failsafe.circuit_breaker.state(), CircuitState::Open);

        let err = failsafe
            .call(predicates::standard, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        let registry = CircuitBreakerRegistry::default();
        let failsafe = Failsafe::new(&registry, "slow", &config());
        let calls = AtomicU32::new(0);

        let value = failsafe
            .call(predicates::standard, || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(120)).await;
                }
                Ok(1)
            })
            .await
            .unwrap();

        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_after_exhaustion() {
        let registry = CircuitBreakerRegistry::default();
        let failsafe = Failsafe::new(&registry, "rag", &config());

        let value = failsafe
            .call_with_fallback(
                predicates::standard,
                || async { Err(Error::from_status(404, "missing")) },
                || async { Ok("sorry") },
            )
            .await
            .unwrap();
        assert_eq!(value, "sorry");
    }

    #[test]
    fn test_shared_breaker_across_failsafes() {
        let registry = CircuitBreakerRegistry::default();
        let chat = Failsafe::new(&registry, "rag", &config());
        let docs = Failsafe::new(&registry, "rag", &config());
        assert!(Arc::ptr_eq(&chat.circuit_breaker, &docs.circuit_breaker));
        assert_eq!(chat.name(), "rag");
    }
}
