//! Domain Layer - Core currency and subscription types.
//!
//! This layer contains the core domain types for rate lookups and
//! subscriptions with no transport dependencies.

/// Supported currencies and currency pairs.
pub mod currency;

/// Rate quotes and update ticks.
pub mod streaming;

/// Per-client subscription tracking.
pub mod subscription;
