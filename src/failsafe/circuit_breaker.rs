//! Circuit breaker implementation

use std::fmt;
use std::future::{Future, Ready};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed (allowing requests)
    Closed,
    /// Circuit is open (blocking requests)
    Open,
    /// Circuit is half-open (allowing trial requests)
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

/// Rejection produced while the circuit is open and cooling down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitOpen {
    /// Name of the breaker that rejected the call
    pub name: String,
}

impl fmt::Display for CircuitOpen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Circuit breaker is OPEN for {}. Service temporarily unavailable.",
            self.name
        )
    }
}

impl std::error::Error for CircuitOpen {}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures
    pub failures: u32,
    /// Successes recorded while half-open
    pub successes: u32,
    /// Last failure (millis since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<u64>,
    /// Calls seen since creation, rejected ones included
    pub total_calls: u64,
    /// Failures seen since creation
    pub total_failures: u64,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { next_attempt_at: Instant },
    HalfOpen { successes: u32 },
}

impl Phase {
    fn state(self) -> CircuitState {
        match self {
            Self::Closed => CircuitState::Closed,
            Self::Open { .. } => CircuitState::Open,
            Self::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    failures: u32,
    last_failure: Option<SystemTime>,
    total_calls: u64,
    total_failures: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            phase: Phase::Closed,
            failures: 0,
            last_failure: None,
            total_calls: 0,
            total_failures: 0,
        }
    }
}

enum Admission {
    Proceed,
    Reject,
}

type NoFallback<T, E> = fn() -> Ready<Result<T, E>>;

// Cooldown used when `reset_timeout` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Circuit breaker guarding one named remote dependency
pub struct CircuitBreaker {
    name: String,
    enabled: bool,
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: &str, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            enabled: config.enabled,
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            reset_timeout: config.reset_timeout,
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` under the breaker
    ///
    /// While open and cooling down, `f` is not called and a [`CircuitOpen`]
    /// rejection is converted into `E`. A failure of `f` is returned as is.
    pub async fn execute<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpen>,
    {
        self.run(f, None::<NoFallback<T, E>>).await
    }

    /// Run `f` under the breaker, substituting `fallback` for rejections and failures
    pub async fn execute_with_fallback<T, E, F, Fut, Fb, FbFut>(
        &self,
        f: F,
        fallback: Fb,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
        E: From<CircuitOpen>,
    {
        self.run(f, Some(fallback)).await
    }

    async fn run<T, E, F, Fut, Fb, FbFut>(&self, f: F, fallback: Option<Fb>) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
        E: From<CircuitOpen>,
    {
        if let Admission::Reject = self.admit() {
            warn!(
                breaker = %self.name,
                fallback = fallback.is_some(),
                "Circuit open, rejecting call"
            );
            return match fallback {
                Some(fallback) => fallback().await,
                None => Err(CircuitOpen {
                    name: self.name.clone(),
                }
                .into()),
            };
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                match fallback {
                    Some(fallback) => {
                        warn!(breaker = %self.name, "Call failed, using fallback");
                        fallback().await
                    }
                    None => Err(error),
                }
            }
        }
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;

        if !self.enabled {
            return Admission::Proceed;
        }

        match inner.phase {
            Phase::Open { next_attempt_at } if Instant::now() < next_attempt_at => {
                Admission::Reject
            }
            Phase::Open { .. } => {
                inner.phase = Phase::HalfOpen { successes: 0 };
                debug!(breaker = %self.name, "Transition: OPEN -> HALF_OPEN");
                Admission::Proceed
            }
            Phase::Closed | Phase::HalfOpen { .. } => Admission::Proceed,
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failures = 0;

        if let Phase::HalfOpen { successes } = inner.phase {
            let successes = successes + 1;
            if successes >= self.success_threshold {
                inner.phase = Phase::Closed;
                info!(breaker = %self.name, "Transition: HALF_OPEN -> CLOSED (recovered)");
            } else {
                inner.phase = Phase::HalfOpen { successes };
                debug!(
                    breaker = %self.name,
                    successes,
                    threshold = self.success_threshold,
                    "Success in half-open state"
                );
            }
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.total_failures += 1;
        inner.last_failure = Some(SystemTime::now());

        if !self.enabled {
            return;
        }

        match inner.phase {
            Phase::HalfOpen { .. } => {
                inner.phase = self.open_phase();
                warn!(breaker = %self.name, "Transition: HALF_OPEN -> OPEN (recovery failed)");
            }
            Phase::Closed if inner.failures >= self.failure_threshold => {
                inner.phase = self.open_phase();
                warn!(
                    breaker = %self.name,
                    failures = inner.failures,
                    threshold = self.failure_threshold,
                    "Transition: CLOSED -> OPEN (threshold reached)"
                );
            }
            Phase::Closed | Phase::Open { .. } => {}
        }
    }

    fn open_phase(&self) -> Phase {
        let now = Instant::now();
        Phase::Open {
            next_attempt_at: now
                .checked_add(self.reset_timeout)
                .unwrap_or_else(|| now + FAR_FUTURE),
        }
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().phase.state()
    }

    /// Snapshot of counters and state
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            state: inner.phase.state(),
            failures: inner.failures,
            successes: match inner.phase {
                Phase::HalfOpen { successes } => successes,
                _ => 0,
            },
            last_failure_time: inner.last_failure.map(|t| {
                u64::try_from(
                    t.duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis(),
                )
                .unwrap_or(u64::MAX)
            }),
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
        }
    }

    /// Force the breaker back to closed and clear its counters
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
        info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Force a state; forcing open starts a fresh cooldown
    pub fn set_state(&self, state: CircuitState) {
        let mut inner = self.inner.lock();
        inner.phase = match state {
            CircuitState::Closed => Phase::Closed,
            CircuitState::Open => self.open_phase(),
            CircuitState::HalfOpen => Phase::HalfOpen { successes: 0 },
        };
        debug!(breaker = %self.name, %state, "Circuit state forced");
    }

    /// Human-readable status line
    pub fn status_message(&self) -> String {
        let inner = self.inner.lock();
        match inner.phase {
            Phase::Closed => format!("Dependency '{}' is healthy (circuit closed)", self.name),
            Phase::Open { next_attempt_at } => {
                let remaining = next_attempt_at.saturating_duration_since(Instant::now());
                format!(
                    "Dependency '{}' is unavailable: circuit breaker is open after {} failures, retry in {} seconds",
                    self.name,
                    inner.failures,
                    remaining.as_secs_f64().ceil()
                )
            }
            Phase::HalfOpen { successes } => format!(
                "Dependency '{}' is half-open, testing recovery ({successes}/{} successes)",
                self.name, self.success_threshold
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::Error;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test-circuit",
            &CircuitBreakerConfig {
                enabled: true,
                failure_threshold: 3,
                success_threshold: 2,
                reset_timeout: Duration::from_millis(1000),
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<&'static str, Error> {
        cb.execute(|| async { Err(Error::from_status(500, "fail")) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<&'static str, Error> {
        cb.execute(|| async { Ok("success") }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_passes_through() {
        let cb = breaker();
        assert_eq!(succeed(&cb).await.unwrap(), "success");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().total_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_threshold() {
        let cb = breaker();
        for _ in 0..2 {
            let err = fail(&cb).await.unwrap_err();
            assert!(matches!(err, Error::Status { status: 500, .. }));
            assert_eq!(cb.state(), CircuitState::Closed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = breaker();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.stats().failures, 0);

        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.failures, 3);
        assert_eq!(stats.total_failures, 3);
        assert!(stats.last_failure_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_calling() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }

        let calls = AtomicU32::new(0);
        let err = cb
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>("success")
            })
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert!(err.to_string().contains("test-circuit"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.stats().total_failures, 3);
        assert_eq!(cb.stats().total_calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_uses_fallback() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }

        let calls = AtomicU32::new(0);
        let value = cb
            .execute_with_fallback(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>("success")
                },
                || async { Ok("fallback") },
            )
            .await
            .unwrap();

        assert_eq!(value, "fallback");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.stats().total_failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_on_closed_failure() {
        let cb = breaker();
        let value = cb
            .execute_with_fallback(
                || async { Err(Error::from_status(502, "bad gateway")) },
                || async { Ok("degraded") },
            )
            .await
            .unwrap();
        assert_eq!(value, "degraded");
        assert_eq!(cb.stats().failures, 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout_calls_once() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_millis(1100)).await;

        let calls = AtomicU32::new(0);
        cb.execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(())
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::HalfOpen);
        assert_eq!(stats.successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_success_threshold() {
        let cb = breaker();
        cb.set_state(CircuitState::Open);
        tokio::time::advance(Duration::from_millis(1100)).await;

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker();
        cb.set_state(CircuitState::Open);
        tokio::time::advance(Duration::from_millis(1100)).await;

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        // fresh cooldown starts at the reopening
        tokio::time::advance(Duration::from_millis(900)).await;
        assert!(succeed(&cb).await.unwrap_err().is_circuit_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_open_before_timeout() {
        let cb = breaker();
        cb.set_state(CircuitState::Open);
        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(succeed(&cb).await.unwrap_err().is_circuit_open());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_everything() {
        let cb = breaker();
        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        cb.reset();
        assert_eq!(
            cb.stats(),
            CircuitBreakerStats {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure_time: None,
                total_calls: 0,
                total_failures: 0,
            }
        );
        assert_eq!(succeed(&cb).await.unwrap(), "success");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_never_opens() {
        let cb = CircuitBreaker::new(
            "disabled",
            &CircuitBreakerConfig {
                enabled: false,
                ..CircuitBreakerConfig::default()
            },
        );
        for _ in 0..20 {
            fail(&cb).await.unwrap_err();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().total_failures, 20);
        assert_eq!(succeed(&cb).await.unwrap(), "success");
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_message() {
        let cb = breaker();
        assert!(cb.status_message().contains("closed"));

        for _ in 0..3 {
            fail(&cb).await.unwrap_err();
        }
        let message = cb.status_message();
        assert!(message.contains("'test-circuit'"));
        assert!(message.contains("circuit breaker is open"));
        assert!(message.contains("3 failures"));
        assert!(message.contains("retry in 1 seconds"));

        cb.set_state(CircuitState::HalfOpen);
        assert!(cb.status_message().contains("testing recovery"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_reset_timeout_stays_open() {
        let cb = CircuitBreaker::new(
            "slow-recovery",
            &CircuitBreakerConfig {
                enabled: true,
                failure_threshold: 1,
                success_threshold: 1,
                reset_timeout: Duration::from_secs(u64::MAX),
            },
        );

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(succeed(&cb).await.unwrap_err().is_circuit_open());

        cb.reset();
        cb.set_state(CircuitState::Open);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.status_message().contains("circuit breaker is open"));
    }

    #[test]
    fn test_state_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"HALF_OPEN\""
        );
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }
}
