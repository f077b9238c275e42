//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, rate monitor status, and Prometheus
//! metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (ready after the first rate refresh)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{MonitorSnapshot, MonitorStatus};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::broadcast::SharedRateUpdateHub;
use crate::infrastructure::metrics::get_metrics_handle;

/// Consecutive refresh failures at which the service reports unhealthy.
const UNHEALTHY_FAILURES: u32 = 3;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Rate monitor status.
    pub rates: RatesStatus,
    /// Subscription stream status.
    pub streams: StreamsStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Rates refreshing normally.
    Healthy,
    /// Recent refreshes failed; rates may be stale.
    Degraded,
    /// Refreshes keep failing.
    Unhealthy,
}

/// Rate monitor status.
#[derive(Debug, Clone, Serialize)]
pub struct RatesStatus {
    /// Whether at least one refresh has succeeded.
    pub ready: bool,
    /// Successful refreshes.
    pub ticks: u64,
    /// Failed refreshes since the last success.
    pub consecutive_failures: u32,
    /// Time of the last successful refresh.
    pub last_tick_at: Option<DateTime<Utc>>,
}

/// Subscription stream status.
#[derive(Debug, Clone, Serialize)]
pub struct StreamsStatus {
    /// Open `SubscribeRates` calls.
    pub active: i64,
    /// Registered clients.
    pub clients: usize,
    /// Subscription requests across clients, duplicates included.
    pub subscriptions: usize,
    /// Distinct pairs across clients.
    pub distinct_pairs: usize,
    /// Live receivers on the tick channel.
    pub tick_receivers: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    monitor: Arc<MonitorStatus>,
    registry: Arc<SubscriptionRegistry>,
    hub: SharedRateUpdateHub,
    active_streams: Arc<AtomicI64>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        monitor: Arc<MonitorStatus>,
        registry: Arc<SubscriptionRegistry>,
        hub: SharedRateUpdateHub,
        active_streams: Arc<AtomicI64>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            monitor,
            registry,
            hub,
            active_streams,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
#[derive(Debug)]
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");
        serve(listener, self.state, self.cancel).await
    }
}

/// Serve the health routes on an already bound listener until cancelled.
///
/// # Errors
///
/// Returns `HealthServerError::ServerFailed` if the HTTP server fails.
pub async fn serve(
    listener: TcpListener,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
) -> Result<(), HealthServerError> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

    tracing::info!("Health server stopped");
    Ok(())
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if is_ready(&state.monitor.snapshot()) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let monitor = state.monitor.snapshot();
    let registry = state.registry.stats();

    HealthResponse {
        status: determine_health_status(&monitor),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        rates: RatesStatus {
            ready: is_ready(&monitor),
            ticks: monitor.ticks,
            consecutive_failures: monitor.consecutive_failures,
            last_tick_at: monitor.last_tick_at,
        },
        streams: StreamsStatus {
            active: state.active_streams.load(Ordering::Relaxed),
            clients: registry.client_count,
            subscriptions: registry.subscription_count,
            distinct_pairs: registry.distinct_pairs,
            tick_receivers: state.hub.receiver_count(),
        },
    }
}

const fn is_ready(monitor: &MonitorSnapshot) -> bool {
    monitor.ticks > 0
}

const fn determine_health_status(monitor: &MonitorSnapshot) -> HealthStatus {
    match monitor.consecutive_failures {
        0 => HealthStatus::Healthy,
        n if n < UNHEALTHY_FAILURES => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
