//! Rate Monitor Service
//!
//! Background task that recomputes rates on a fixed interval and publishes a
//! `RatesUpdated` tick after every successful refresh. Subscription streams
//! push on these ticks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{RateSource, RateSourceError, UpdatePublisher};
use crate::domain::streaming::RatesUpdated;

// =============================================================================
// Monitor Status
// =============================================================================

/// Shared view of the monitor's progress, read by the health server.
#[derive(Debug, Default)]
pub struct MonitorStatus {
    ticks: AtomicU64,
    consecutive_failures: AtomicU32,
    last_tick_at: RwLock<Option<DateTime<Utc>>>,
}

impl MonitorStatus {
    /// Create an empty status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful refresh. Returns the new tick sequence number.
    pub fn record_success(&self, at: DateTime<Utc>) -> u64 {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.last_tick_at.write() = Some(at);
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a failed refresh.
    pub fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the status.
    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_tick_at: *self.last_tick_at.read(),
        }
    }
}

/// Copy of `MonitorStatus` at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSnapshot {
    /// Successful refreshes so far.
    pub ticks: u64,
    /// Failed refreshes since the last success.
    pub consecutive_failures: u32,
    /// Time of the last successful refresh.
    pub last_tick_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Rate Monitor
// =============================================================================

/// Polls the rate source and publishes update ticks.
pub struct RateMonitor {
    source: Arc<dyn RateSource>,
    publisher: Arc<dyn UpdatePublisher>,
    interval: Duration,
    status: Arc<MonitorStatus>,
}

impl std::fmt::Debug for RateMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateMonitor")
            .field("interval", &self.interval)
            .field("status", &self.status.snapshot())
            .finish_non_exhaustive()
    }
}

impl RateMonitor {
    /// Create a monitor polling every `interval`.
    #[must_use]
    pub fn new(
        source: Arc<dyn RateSource>,
        publisher: Arc<dyn UpdatePublisher>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            publisher,
            interval,
            status: Arc::new(MonitorStatus::new()),
        }
    }

    /// Shared status handle.
    #[must_use]
    pub fn status(&self) -> Arc<MonitorStatus> {
        Arc::clone(&self.status)
    }

    /// Polling interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Refresh once and publish a tick on success.
    ///
    /// # Errors
    ///
    /// Returns the source's error when the refresh fails; nothing is
    /// published in that case.
    pub async fn tick(&self) -> Result<RatesUpdated, RateSourceError> {
        if let Err(e) = self.source.refresh().await {
            self.status.record_failure();
            return Err(e);
        }

        let at = Utc::now();
        let sequence = self.status.record_success(at);
        let update = RatesUpdated { sequence, at };
        let receivers = self.publisher.publish(update);

        tracing::info!(sequence, receivers, "Rates updated");
        Ok(update)
    }

    /// Run until `shutdown` is cancelled. The first refresh happens
    /// immediately.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = self.interval.as_millis(), "Starting rate monitor");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("Rate monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(
                            error = %e,
                            consecutive_failures = self.status.snapshot().consecutive_failures,
                            "Rate refresh failed"
                        );
                    }
                }
            }
        }
    }

    /// Spawn the monitor loop onto the runtime.
    #[must_use]
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

// =============================================================================
// Tests
// =============================================================================
