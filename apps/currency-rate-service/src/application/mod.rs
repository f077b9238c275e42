//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (rate source, update publishing).
pub mod ports;

/// Application services for rate lookups and rate monitoring.
pub mod services;
