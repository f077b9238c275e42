//! Configuration Module
//!
//! Environment-driven configuration for the currency rate service.

mod settings;

pub use settings::{ConfigError, MonitorSettings, ServerSettings, ServiceConfig, StreamSettings};
