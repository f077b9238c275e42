//! Service Configuration Settings
//!
//! Configuration types for the currency rate service, loaded from
//! environment variables. Unparseable values fall back to their defaults;
//! parsed values that make no sense (a zero interval, for example) are
//! rejected.

use std::time::Duration;

use crate::infrastructure::grpc::retry::ReadRetryConfig;

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// gRPC server port.
    pub grpc_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            grpc_port: 9091,
            health_port: 8083,
        }
    }
}

/// Rate monitor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    /// Time between rate refreshes (and therefore between pushes).
    pub interval: Duration,
    /// Maximum relative move per refresh of the simulated rates.
    pub volatility: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            volatility: 0.05,
        }
    }
}

/// Subscription stream settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Outbound messages buffered per stream.
    pub outbound_buffer: usize,
    /// Capacity of the tick broadcast channel.
    pub updates_capacity: usize,
    /// Backoff after a failed read.
    pub read_retry: ReadRetryConfig,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            outbound_buffer: 64,
            updates_capacity: 64,
            read_retry: ReadRetryConfig::default(),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Rate monitor settings.
    pub monitor: MonitorSettings,
    /// Subscription stream settings.
    pub stream: StreamSettings,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = Self::default();

        let server = ServerSettings {
            grpc_port: env.parse("CURRENCY_GRPC_PORT", defaults.server.grpc_port),
            health_port: env.parse("CURRENCY_HEALTH_PORT", defaults.server.health_port),
        };

        let monitor = MonitorSettings {
            interval: env.millis("CURRENCY_MONITOR_INTERVAL_MS", defaults.monitor.interval),
            volatility: env.parse("CURRENCY_RATE_VOLATILITY", defaults.monitor.volatility),
        };

        let read_retry = ReadRetryConfig {
            initial_delay: env.millis(
                "CURRENCY_READ_RETRY_INITIAL_MS",
                defaults.stream.read_retry.initial_delay,
            ),
            max_delay: env.millis(
                "CURRENCY_READ_RETRY_MAX_MS",
                defaults.stream.read_retry.max_delay,
            ),
            max_attempts: env.parse(
                "CURRENCY_READ_RETRY_MAX_ATTEMPTS",
                defaults.stream.read_retry.max_attempts,
            ),
            ..defaults.stream.read_retry
        };

        let stream = StreamSettings {
            outbound_buffer: env.parse("CURRENCY_STREAM_BUFFER", defaults.stream.outbound_buffer),
            updates_capacity: env.parse(
                "CURRENCY_UPDATES_CAPACITY",
                defaults.stream.updates_capacity,
            ),
            read_retry,
        };

        let config = Self {
            server,
            monitor,
            stream,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.interval.is_zero() {
            return Err(ConfigError::invalid(
                "CURRENCY_MONITOR_INTERVAL_MS",
                "must be greater than zero",
            ));
        }
        if !(0.0..1.0).contains(&self.monitor.volatility) {
            return Err(ConfigError::invalid(
                "CURRENCY_RATE_VOLATILITY",
                "must be in [0, 1)",
            ));
        }
        if self.stream.outbound_buffer == 0 {
            return Err(ConfigError::invalid(
                "CURRENCY_STREAM_BUFFER",
                "must be greater than zero",
            ));
        }
        if self.stream.updates_capacity == 0 {
            return Err(ConfigError::invalid(
                "CURRENCY_UPDATES_CAPACITY",
                "must be greater than zero",
            ));
        }
        if self.stream.read_retry.max_delay < self.stream.read_retry.initial_delay {
            return Err(ConfigError::invalid(
                "CURRENCY_READ_RETRY_MAX_MS",
                "must not be less than CURRENCY_READ_RETRY_INITIAL_MS",
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A setting is out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, reason: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.lookup)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        (self.lookup)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
