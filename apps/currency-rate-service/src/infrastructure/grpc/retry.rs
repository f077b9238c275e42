//! Read Retry Policy
//!
//! Backoff applied by a subscription stream's reader after a transport read
//! error. Each consecutive failure waits longer, up to `max_delay`; after
//! `max_attempts` consecutive failures the reader gives up and the stream is
//! torn down. A successful read resets the policy.

use std::time::Duration;

use rand::Rng;

/// Read retry settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadRetryConfig {
    /// Delay after the first failed read.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Consecutive failures tolerated before giving up (0 = unbounded).
    pub max_attempts: u32,
}

impl Default for ReadRetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 5,
        }
    }
}

/// Per-stream retry state.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use currency_rate_service::infrastructure::grpc::retry::{ReadRetryConfig, ReadRetryPolicy};
///
/// let mut policy = ReadRetryPolicy::new(ReadRetryConfig {
///     jitter_factor: 0.0,
///     max_attempts: 2,
///     ..ReadRetryConfig::default()
/// });
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
/// assert_eq!(policy.next_delay(), None);
///
/// policy.reset();
/// assert_eq!(policy.failures(), 0);
/// ```
#[derive(Debug)]
pub struct ReadRetryPolicy {
    config: ReadRetryConfig,
    failures: u32,
}

impl ReadRetryPolicy {
    /// Create a policy with no recorded failures.
    #[must_use]
    pub const fn new(config: ReadRetryConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Record a failed read and return how long to wait before the next one.
    ///
    /// Returns `None` once the attempt cap is reached.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }

        let delay = self.base_delay(self.failures);
        self.failures = self.failures.saturating_add(1);
        Some(self.jitter(delay))
    }

    /// Clear the failure count after a successful read.
    pub const fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures recorded so far.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether the attempt cap has been reached.
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.failures >= self.config.max_attempts
    }

    fn base_delay(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.max(1.0).powi(exponent);
        let max_secs = self.config.max_delay.as_secs_f64();
        let secs = (self.config.initial_delay.as_secs_f64() * factor).min(max_secs);

        if secs.is_finite() {
            Duration::from_secs_f64(secs)
        } else {
            self.config.max_delay
        }
    }

    fn jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let spread = self.config.jitter_factor.min(1.0);
        let scale = rand::rng().random_range((1.0 - spread)..=(1.0 + spread));
        delay.mul_f64(scale)
    }
}
