//! Prometheus metrics for the webhook server

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::Result;
use crate::error::Error;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

// Server metrics
const METRIC_UPTIME: &str = "guard_uptime_seconds";
const METRIC_INFO: &str = "guard_info";

// Webhook handler metrics
const METRIC_REQUESTS: &str = "guard_http_requests_total";
const METRIC_REQUEST_DURATION: &str = "guard_http_request_duration_seconds";
const METRIC_RESPONSE_SIZE: &str = "guard_http_response_size_bytes";
const METRIC_IN_FLIGHT: &str = "guard_http_in_flight_requests";

// Decision cache metrics
const METRIC_CACHE_HITS: &str = "guard_decision_cache_hits_total";
const METRIC_CACHE_MISSES: &str = "guard_decision_cache_misses_total";
const METRIC_CACHE_REJECTED: &str = "guard_decision_cache_rejected_total";
const METRIC_CACHE_SIZE: &str = "guard_decision_cache_entries";

// Remote policy API metrics
const METRIC_ARM_CALL_DURATION: &str = "guard_arm_checkaccess_duration_seconds";
const METRIC_ARM_THROTTLED: &str = "guard_arm_throttle_signals_total";
const METRIC_TOKEN_REFRESH: &str = "guard_token_refresh_total";

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];
const SIZE_BUCKETS: &[f64] = &[64.0, 128.0, 256.0, 512.0, 1024.0, 4096.0, 16384.0];

/// Initialize Prometheus metrics recorder.
pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .and_then(|b| {
            b.set_buckets_for_metric(Matcher::Full(METRIC_RESPONSE_SIZE.to_string()), SIZE_BUCKETS)
        })
        .map_err(|e| Error::Config(format!("Invalid metrics buckets: {e}")))?
        .install_recorder()
        .map_err(|e| Error::Config(format!("Failed to install metrics recorder: {e}")))?;

    PROMETHEUS_HANDLE.set(handle).ok();
    START_TIME.set(Instant::now()).ok();

    register_metrics();
    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

fn register_metrics() {
    describe_gauge!(METRIC_UPTIME, "Server uptime in seconds");
    describe_gauge!(METRIC_INFO, "Server information (always 1)");

    describe_counter!(METRIC_REQUESTS, "Webhook requests by handler, code and method");
    describe_histogram!(
        METRIC_REQUEST_DURATION,
        "Webhook request latency in seconds by handler"
    );
    describe_histogram!(
        METRIC_RESPONSE_SIZE,
        "Webhook response size in bytes by handler"
    );
    describe_gauge!(METRIC_IN_FLIGHT, "Webhook requests currently being served");

    describe_counter!(METRIC_CACHE_HITS, "Authorization decisions served from cache");
    describe_counter!(METRIC_CACHE_MISSES, "Authorization decision cache misses");
    describe_counter!(
        METRIC_CACHE_REJECTED,
        "Decisions not cached because the entry was too large"
    );
    describe_gauge!(METRIC_CACHE_SIZE, "Current decision cache size (entries)");

    describe_histogram!(
        METRIC_ARM_CALL_DURATION,
        "Remote check-access call latency in seconds"
    );
    describe_counter!(
        METRIC_ARM_THROTTLED,
        "Throttle signals from the remote policy API by cause"
    );
    describe_counter!(METRIC_TOKEN_REFRESH, "Token refresh attempts by provider and status");

    gauge!(
        METRIC_INFO,
        "version" => env!("CARGO_PKG_VERSION"),
    )
    .set(1.0);
}

/// Render metrics in Prometheus text format.
#[must_use]
pub fn render_metrics() -> String {
    if let Some(start) = START_TIME.get() {
        gauge!(METRIC_UPTIME).set(start.elapsed().as_secs_f64());
    }

    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

/// Guard that keeps a request counted as in flight until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    handler: &'static str,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(METRIC_IN_FLIGHT, "handler" => self.handler).decrement(1.0);
    }
}

/// Mark a webhook request as in flight.
#[must_use]
pub fn track_in_flight(handler: &'static str) -> InFlightGuard {
    gauge!(METRIC_IN_FLIGHT, "handler" => handler).increment(1.0);
    InFlightGuard { handler }
}

/// Record a completed webhook request.
#[allow(clippy::cast_precision_loss)]
pub fn record_request(
    handler: &'static str,
    method: &str,
    code: u16,
    duration: Duration,
    response_size: Option<u64>,
) {
    counter!(
        METRIC_REQUESTS,
        "handler" => handler,
        "method" => method.to_owned(),
        "code" => code.to_string(),
    )
    .increment(1);

    histogram!(METRIC_REQUEST_DURATION, "handler" => handler).record(duration.as_secs_f64());

    if let Some(size) = response_size {
        histogram!(METRIC_RESPONSE_SIZE, "handler" => handler).record(size as f64);
    }
}

/// Record a decision cache hit.
pub fn record_cache_hit() {
    counter!(METRIC_CACHE_HITS).increment(1);
}

/// Record a decision cache miss.
pub fn record_cache_miss() {
    counter!(METRIC_CACHE_MISSES).increment(1);
}

/// Record a decision that could not be cached.
pub fn record_cache_rejected() {
    counter!(METRIC_CACHE_REJECTED).increment(1);
}

/// Update decision cache size gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_cache_size(size: u64) {
    gauge!(METRIC_CACHE_SIZE).set(size as f64);
}

/// Record a remote check-access call.
pub fn record_arm_call(status: u16, duration: Duration) {
    histogram!(
        METRIC_ARM_CALL_DURATION,
        "code" => status.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a throttle signal (`status_429` or `low_quota`).
pub fn record_arm_throttle(cause: &'static str) {
    counter!(METRIC_ARM_THROTTLED, "cause" => cause).increment(1);
}

/// Record a token refresh attempt.
pub fn record_token_refresh(provider: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        METRIC_TOKEN_REFRESH,
        "provider" => provider,
        "status" => status,
    )
    .increment(1);
}
