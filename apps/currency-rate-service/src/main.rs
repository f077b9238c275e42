//! Currency Rate Service Binary
//!
//! Starts the gRPC currency service, the rate monitor, and the health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin currency-rate-service
//! ```
//!
//! # Environment Variables
//!
//! - `CURRENCY_GRPC_PORT`: gRPC server port (default: 9091)
//! - `CURRENCY_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `CURRENCY_MONITOR_INTERVAL_MS`: Rate refresh and push interval (default: 5000)
//! - `CURRENCY_RATE_VOLATILITY`: Maximum relative move per refresh (default: 0.05)
//! - `CURRENCY_STREAM_BUFFER`: Outbound messages buffered per stream (default: 64)
//! - `CURRENCY_UPDATES_CAPACITY`: Tick channel capacity (default: 64)
//! - `CURRENCY_READ_RETRY_INITIAL_MS`: First backoff after a read error (default: 100)
//! - `CURRENCY_READ_RETRY_MAX_MS`: Backoff cap (default: 5000)
//! - `CURRENCY_READ_RETRY_MAX_ATTEMPTS`: Read errors before a stream closes, 0 = never (default: 5)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: currency-rate-service)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use currency_rate_service::infrastructure::grpc::proto::currency::v1::currency_server::CurrencyServer;
use currency_rate_service::infrastructure::health::{HealthServer, HealthServerState};
use currency_rate_service::infrastructure::telemetry;
use currency_rate_service::{
    CurrencyService, CurrencyServiceConfig, ExchangeRates, FILE_DESCRIPTOR_SET, RateMonitor,
    RateService, RateUpdateHub, ServiceConfig, SubscriptionRegistry, init_metrics,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Currency Rate Service");

    let _metrics_handle = init_metrics()?;

    let config = ServiceConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
    })?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Rate source
    let rates = Arc::new(
        ExchangeRates::with_reference_rates(config.monitor.volatility).inspect_err(|e| {
            tracing::error!(error = %e, "Unable to initialize rates");
        })?,
    );
    let rate_service = RateService::new(rates.clone());

    // Tick fan-out and subscriptions
    let hub = Arc::new(RateUpdateHub::new(config.stream.updates_capacity));
    let registry = Arc::new(SubscriptionRegistry::new());

    // Rate monitor
    let monitor = RateMonitor::new(rates, hub.clone(), config.monitor.interval);
    let monitor_status = monitor.status();
    let monitor_handle = monitor.spawn(shutdown_token.clone());

    // gRPC service
    let currency_service = CurrencyService::new(
        CurrencyServiceConfig::from(&config.stream),
        rate_service,
        Arc::clone(&hub),
        Arc::clone(&registry),
        shutdown_token.clone(),
    );

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        monitor_status,
        registry,
        hub,
        currency_service.active_streams(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // gRPC server
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], config.server.grpc_port));
    let listener = TcpListener::bind(grpc_addr).await.inspect_err(|e| {
        tracing::error!(addr = %grpc_addr, error = %e, "Unable to bind gRPC listener");
    })?;
    tracing::info!(addr = %grpc_addr, "gRPC server listening");

    let grpc_shutdown = shutdown_token.clone();
    let mut grpc_handle = tokio::spawn(async move {
        Server::builder()
            .add_service(CurrencyServer::new(currency_service))
            .add_service(reflection)
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                grpc_shutdown.cancelled_owned(),
            )
            .await
    });

    tracing::info!("Currency rate service ready");

    let mut exit: Result<(), Box<dyn std::error::Error>> = Ok(());
    tokio::select! {
        () = await_shutdown() => {}
        result = &mut grpc_handle => {
            match result {
                Ok(Ok(())) => tracing::warn!("gRPC server exited unexpectedly"),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "gRPC server error");
                    exit = Err(e.into());
                }
                Err(e) => {
                    tracing::error!(error = %e, "gRPC server task failed");
                    exit = Err(e.into());
                }
            }
        }
    }

    shutdown_token.cancel();
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        if !grpc_handle.is_finished() {
            let _ = (&mut grpc_handle).await;
        }
        let _ = monitor_handle.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Graceful shutdown timed out");
    }

    tracing::info!("Currency rate service stopped");
    exit
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        grpc_port = config.server.grpc_port,
        health_port = config.server.health_port,
        monitor_interval_ms = config.monitor.interval.as_millis(),
        volatility = config.monitor.volatility,
        "Configuration loaded"
    );
    tracing::debug!(
        outbound_buffer = config.stream.outbound_buffer,
        updates_capacity = config.stream.updates_capacity,
        read_retry_max_attempts = config.stream.read_retry.max_attempts,
        "Stream settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
