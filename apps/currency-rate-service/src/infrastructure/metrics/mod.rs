//! Prometheus Metrics Module
//!
//! Exposes service metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Requests**: unary `GetRate` outcomes
//! - **Streams**: active subscription streams, accepted subscriptions, read errors
//! - **Pushes**: rate updates sent to clients and per-tick fan-out
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls return the existing handle.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "currency_rate_requests_total",
        "Total GetRate requests by outcome"
    );

    describe_gauge!(
        "currency_active_streams",
        "Number of open SubscribeRates streams"
    );
    describe_counter!(
        "currency_subscriptions_total",
        "Total subscription requests by outcome"
    );
    describe_counter!(
        "currency_stream_read_errors_total",
        "Total transport errors reading subscription streams"
    );

    describe_counter!(
        "currency_rate_pushes_total",
        "Total rate updates sent to subscribers"
    );
    describe_counter!("currency_rate_ticks_total", "Total rate update ticks published");
    describe_histogram!(
        "currency_rate_tick_receivers",
        "Streams notified per rate update tick"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for requests and subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Served or accepted.
    Ok,
    /// Rejected as malformed or same-currency.
    InvalidRequest,
    /// No rate data available.
    RateUnavailable,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidRequest => "invalid_request",
            Self::RateUnavailable => "rate_unavailable",
        }
    }
}

/// Record a `GetRate` call.
pub fn record_rate_request(outcome: Outcome) {
    counter!(
        "currency_rate_requests_total",
        "method" => "get_rate",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a subscription request read from a stream.
pub fn record_subscription(outcome: Outcome) {
    counter!(
        "currency_subscriptions_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a transport read error on a subscription stream.
pub fn record_stream_read_error() {
    counter!("currency_stream_read_errors_total").increment(1);
}

/// Update the open stream count.
pub fn set_active_streams(count: f64) {
    gauge!("currency_active_streams").set(count);
}

/// Record rate updates sent on one stream for one tick.
pub fn record_pushes(count: u64) {
    counter!("currency_rate_pushes_total").increment(count);
}

/// Record a published tick and how many streams it reached.
#[allow(clippy::cast_precision_loss)]
pub fn record_tick(receivers: usize) {
    counter!("currency_rate_ticks_total").increment(1);
    histogram!("currency_rate_tick_receivers").record(receivers as f64);
}

// =============================================================================
// Tests
// =============================================================================
