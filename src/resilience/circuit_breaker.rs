//! Consecutive-failure circuit breaker.

use std::time::Duration;

use serde::Serialize;
use strum::{Display, EnumString};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};
use utoipa::ToSchema;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe.
    pub open_duration: Duration,
    /// Successful probes needed to close from half-open.
    pub half_open_successes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            half_open_successes: 2,
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected.
    Open,
    /// Probing whether the dependency recovered.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding a single dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Current state. An open breaker whose wait has elapsed still reports `Open`
    /// until the next call is admitted.
    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Decide whether a call may proceed, moving open to half-open once the wait elapsed.
    pub async fn try_acquire(&self) -> bool {
        let mut inner = self.inner.write().await;

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let waited = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_duration)
                    .unwrap_or(true);

                if waited {
                    info!(breaker = %self.name, "Circuit breaker half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.half_open_successes {
                info!(breaker = %self.name, "Circuit breaker closed");
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.half_open_successes = 0;
            }
        }
    }

    /// Record a failed call. Returns true if this failure opened the breaker.
    pub async fn record_failure(&self) -> bool {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures += 1;

        let should_open = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };

        if should_open {
            warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                "Circuit breaker opened"
            );
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.half_open_successes = 0;
        }

        should_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, open_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: threshold,
                open_duration: Duration::from_millis(open_ms),
                half_open_successes: 1,
            },
        )
    }

    #[tokio::test]
    async fn opens_after_threshold() {
        let cb = breaker(2, 10_000);
        assert!(!cb.record_failure().await);
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.record_failure().await);
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.try_acquire().await);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let cb = breaker(2, 10_000);
        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_closes_on_success() {
        let cb = breaker(1, 20);
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(cb.try_acquire().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_reopens_on_failure() {
        let cb = breaker(3, 20);
        for _ in 0..3 {
            cb.record_failure().await;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(cb.try_acquire().await);
        assert!(cb.record_failure().await);
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[test]
    fn new_breaker_admits_calls() {
        let cb = breaker(1, 10_000);
        tokio_test::block_on(async {
            assert_eq!(cb.state().await, CircuitState::Closed);
            assert!(cb.try_acquire().await);
        });
    }

    #[test]
    fn state_labels() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
        assert_eq!("OPEN".parse::<CircuitState>().unwrap(), CircuitState::Open);
    }
}
