#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Currency Rate Service - Exchange Rate Lookups and Subscriptions
//!
//! A gRPC service answering unary exchange-rate lookups and keeping
//! bidirectional subscription streams open, pushing fresh rates for the
//! currency pairs each client asked for.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no transport dependencies
//!   - `currency`: Currency codes and validated pairs
//!   - `streaming`: Rate quotes and update ticks
//!   - `subscription`: Per-client subscription registry
//!
//! - **Application**: Port definitions and services
//!   - `ports`: Rate source and update publisher interfaces
//!   - `services`: Rate lookups and the background rate monitor
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `rates`: In-memory EUR-based rate table
//!   - `broadcast`: Tick fan-out to subscription streams
//!   - `grpc`: gRPC server and per-client stream pump
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                  refresh            RatesUpdated
//! ExchangeRates ◄───────── RateMonitor ──────────► RateUpdateHub
//!       ▲                                               │ tick
//!       │ rate(pair)                                    ▼
//!       └──────────────────────────────── sender (per client) ──► RateResponse stream
//!                                               ▲
//!                          SubscriptionRegistry │ snapshot
//!                                               │
//!                 RateRequest stream ──► reader (per client)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core currency and subscription types.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::currency::{CurrencyCode, CurrencyError, CurrencyPair};
pub use domain::streaming::{RateQuote, RatesUpdated};
pub use domain::subscription::{
    ClientId, RegistryStats, SubscriptionGuard, SubscriptionRegistry,
};

// Application
pub use application::ports::{RateSource, RateSourceError, UpdatePublisher};
pub use application::services::{MonitorStatus, RateLookupError, RateMonitor, RateService};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, MonitorSettings, ServerSettings, ServiceConfig, StreamSettings,
};

// Adapters
pub use infrastructure::broadcast::{RateUpdateHub, SharedRateUpdateHub};
pub use infrastructure::rates::{ExchangeRates, ExchangeRatesError};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// gRPC server (for integration tests)
pub use infrastructure::grpc::{
    FILE_DESCRIPTOR_SET, proto::currency::v1 as proto,
    server::{CurrencyService, CurrencyServiceConfig},
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
