//! Prometheus metrics for registry latency and resilience tracking.
//!
//! This module provides metrics for:
//! - Registry call latency
//! - Retry, circuit breaker and time limiter activity
//! - Fallback usage
//! - Registration validation
//! - Error responses by code

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{debug, warn};

// === Metric Name Constants ===

/// Registry call latency metric name.
pub const METRIC_REGISTRY_LATENCY: &str = "registry_request_latency_ms";
/// Statistics aggregation latency metric name.
pub const METRIC_STATS_LATENCY: &str = "stats_aggregation_latency_ms";
/// Registry failures counter metric name.
pub const METRIC_REGISTRY_FAILURES: &str = "registry_failures_total";
/// Retries counter metric name.
pub const METRIC_RETRIES: &str = "resilience_retries_total";
/// Circuit opened counter metric name.
pub const METRIC_CIRCUIT_OPENED: &str = "resilience_circuit_opened_total";
/// Calls rejected by an open circuit counter metric name.
pub const METRIC_CIRCUIT_REJECTED: &str = "resilience_circuit_rejected_total";
/// Time limiter expiries counter metric name.
pub const METRIC_TIMEOUTS: &str = "resilience_timeouts_total";
/// Fallback responses counter metric name.
pub const METRIC_FALLBACKS: &str = "discovery_fallbacks_total";
/// Validated registrations counter metric name.
pub const METRIC_REGISTRATIONS_VALIDATED: &str = "registrations_validated_total";
/// Error responses counter metric name.
pub const METRIC_HTTP_ERRORS: &str = "http_error_responses_total";

/// Initialize all metric descriptions.
/// Call this once at startup, after the recorder is installed.
pub fn init_metrics() {
    // Latency histograms
    describe_histogram!(
        METRIC_REGISTRY_LATENCY,
        "Registry HTTP call latency in milliseconds"
    );
    describe_histogram!(
        METRIC_STATS_LATENCY,
        "Time to aggregate service statistics in milliseconds"
    );

    // Counters
    describe_counter!(
        METRIC_REGISTRY_FAILURES,
        "Total number of failed registry lookups"
    );
    describe_counter!(METRIC_RETRIES, "Total number of retried registry calls");
    describe_counter!(
        METRIC_CIRCUIT_OPENED,
        "Total number of times a circuit breaker opened"
    );
    describe_counter!(
        METRIC_CIRCUIT_REJECTED,
        "Total number of calls rejected by an open circuit breaker"
    );
    describe_counter!(
        METRIC_TIMEOUTS,
        "Total number of registry calls that exceeded the time limit"
    );
    describe_counter!(
        METRIC_FALLBACKS,
        "Total number of responses served from the fallback service list"
    );
    describe_counter!(
        METRIC_REGISTRATIONS_VALIDATED,
        "Total number of registration requests accepted"
    );
    describe_counter!(
        METRIC_HTTP_ERRORS,
        "Total number of error envelopes returned, by error code"
    );

    debug!("Metrics initialized");
}

/// Install the global Prometheus recorder.
///
/// Returns `None` when a recorder is already installed (e.g. a second router in tests).
pub fn install_prometheus() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            init_metrics();
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    }
}

/// Record statistics aggregation latency.
pub fn record_stats_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_STATS_LATENCY).record(latency_ms);
}

/// Increment registry failures counter.
pub fn inc_registry_failures(operation: &'static str) {
    counter!(METRIC_REGISTRY_FAILURES, "operation" => operation).increment(1);
}

/// Increment retries counter.
pub fn inc_retries(policy: &str) {
    counter!(METRIC_RETRIES, "policy" => policy.to_string()).increment(1);
}

/// Increment circuit opened counter.
pub fn inc_circuit_opened(policy: &str) {
    counter!(METRIC_CIRCUIT_OPENED, "policy" => policy.to_string()).increment(1);
}

/// Increment circuit rejected counter.
pub fn inc_circuit_rejected(policy: &str) {
    counter!(METRIC_CIRCUIT_REJECTED, "policy" => policy.to_string()).increment(1);
}

/// Increment timeouts counter.
pub fn inc_timeouts(policy: &str) {
    counter!(METRIC_TIMEOUTS, "policy" => policy.to_string()).increment(1);
}

/// Increment fallbacks counter.
pub fn inc_fallbacks() {
    counter!(METRIC_FALLBACKS).increment(1);
}

/// Increment validated registrations counter.
pub fn inc_registrations_validated() {
    counter!(METRIC_REGISTRATIONS_VALIDATED).increment(1);
}

/// Increment error responses counter.
pub fn inc_http_errors(code: &'static str) {
    counter!(METRIC_HTTP_ERRORS, "code" => code).increment(1);
}

/// RAII guard for timing registry operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
    operation: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric and operation label.
    pub fn new(metric_name: &'static str, operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
            operation,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name, "operation" => self.operation).record(latency_ms);
    }
}

/// Create a latency timer for a registry call.
pub fn timer_registry_call(operation: &'static str) -> LatencyTimer {
    LatencyTimer::new(METRIC_REGISTRY_LATENCY, operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = timer_registry_call("list_services");
        sleep(Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 9.0); // Allow some tolerance
    }

    #[test]
    fn counters_are_safe_without_recorder() {
        inc_retries("consul-service");
        inc_http_errors("SERVICE_NOT_FOUND");
        record_stats_latency(Instant::now());
    }
}
