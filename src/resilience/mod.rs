//! Resilience policy applied around registry calls.
//!
//! A [`ResiliencePolicy`] combines three decorators, outermost first:
//! - circuit breaker: rejects calls while the dependency is known to be down
//! - retry: re-runs retryable failures with exponential backoff
//! - time limiter: bounds every single attempt
//!
//! Only errors for which [`DiscoveryError::is_retryable`] holds are retried
//! and counted by the breaker. "Not found" and argument errors pass straight
//! through.

pub mod circuit_breaker;
pub mod retry;

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::DiscoveryError;
use crate::metrics;

pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use retry::RetryPolicy;

/// Full configuration for a named policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    /// Policy name used in logs and metrics.
    pub name: String,
    /// Retry settings.
    pub retry: RetryPolicy,
    /// Breaker settings.
    pub breaker: BreakerConfig,
    /// Time limit per attempt.
    pub timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            name: "consul-service".to_string(),
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            timeout: Duration::from_secs(3),
        }
    }
}

/// Retry + circuit breaker + time limiter around a fallible async operation.
#[derive(Debug)]
pub struct ResiliencePolicy {
    name: String,
    retry: RetryPolicy,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl ResiliencePolicy {
    /// Build a policy from configuration.
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new(config.name.clone(), config.breaker),
            name: config.name,
            retry: config.retry,
            timeout: config.timeout,
        }
    }

    /// Policy name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current breaker state.
    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    /// Run `operation` under the policy.
    ///
    /// `operation` is invoked once per attempt.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, DiscoveryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DiscoveryError>>,
    {
        let mut attempts = 0u32;

        loop {
            if !self.breaker.try_acquire().await {
                metrics::inc_circuit_rejected(&self.name);
                return Err(DiscoveryError::CircuitOpen {
                    name: self.name.clone(),
                });
            }

            attempts += 1;
            let outcome = match tokio::time::timeout(self.timeout, operation()).await {
                Ok(result) => result,
                Err(_) => {
                    metrics::inc_timeouts(&self.name);
                    Err(DiscoveryError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    })
                }
            };

            let error = match outcome {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if self.breaker.record_failure().await {
                metrics::inc_circuit_opened(&self.name);
            }

            if !self.retry.allows_another(attempts) {
                warn!(
                    policy = %self.name,
                    attempts,
                    error = %error,
                    "Giving up after retries"
                );
                return Err(error);
            }

            let delay = self.retry.next_delay(attempts - 1);
            debug!(
                policy = %self.name,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying registry call"
            );
            metrics::inc_retries(&self.name);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32, failure_threshold: u32) -> ResilienceConfig {
        ResilienceConfig {
            name: "test".to_string(),
            retry: RetryPolicy {
                max_attempts,
                initial_delay_ms: 1,
                backoff_multiplier: 1.0,
                max_delay_ms: 1,
            },
            breaker: BreakerConfig {
                failure_threshold,
                open_duration: Duration::from_secs(60),
                half_open_successes: 1,
            },
            timeout: Duration::from_millis(50),
        }
    }

    fn connection_error() -> DiscoveryError {
        DiscoveryError::connection("down", RegistryError::Unavailable("test".into()))
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = ResiliencePolicy::new(fast_config(3, 10));
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = policy
            .execute(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(connection_error())
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = ResiliencePolicy::new(fast_config(2, 10));
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), _> = policy
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(connection_error())
            })
            .await;

        assert!(matches!(result, Err(DiscoveryError::ConnectionFailed { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_pass_through_once() {
        let policy = ResiliencePolicy::new(fast_config(3, 1));
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), _> = policy
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DiscoveryError::ServiceNotFound("a".into()))
            })
            .await;

        assert!(matches!(result, Err(DiscoveryError::ServiceNotFound(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(policy.circuit_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn open_breaker_fails_fast() {
        let policy = ResiliencePolicy::new(fast_config(1, 2));

        for _ in 0..2 {
            let _: Result<(), _> = policy.execute(|| async { Err(connection_error()) }).await;
        }
        assert_eq!(policy.circuit_state().await, CircuitState::Open);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = policy
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(DiscoveryError::CircuitOpen { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let policy = ResiliencePolicy::new(fast_config(1, 10));

        let result = policy
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(DiscoveryError::Timeout { timeout_ms: 50 })));
    }
}
