//! Application Ports (Driven)
//!
//! Ports define the interfaces the application uses to reach external
//! systems. Infrastructure adapters implement them.
//!
//! - `RateSource`: current exchange rates and periodic recomputation
//! - `UpdatePublisher`: fan-out of "rates updated" ticks to subscribers

mod rate_source_port;
mod update_publisher_port;

pub use rate_source_port::{RateSource, RateSourceError};
pub use update_publisher_port::{NoOpUpdatePublisher, UpdatePublisher};

#[cfg(test)]
pub use rate_source_port::MockRateSource;
