//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the servers that expose them.

/// gRPC currency server and subscription stream pump.
pub mod grpc;

/// Broadcast channel for rate update ticks.
pub mod broadcast;

/// Environment-driven configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// In-memory exchange rate table.
pub mod rates;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
