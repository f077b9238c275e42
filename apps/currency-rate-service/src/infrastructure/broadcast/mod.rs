//! Rate Update Broadcast
//!
//! Fans out `RatesUpdated` ticks from the rate monitor to every open
//! subscription stream over a tokio broadcast channel.
//!
//! Each stream's sender holds its own receiver. The channel is bounded; a
//! stream that falls behind sees `RecvError::Lagged` and resumes with the
//! newest tick, which is enough because every push reads current rates.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::application::ports::UpdatePublisher;
use crate::domain::streaming::RatesUpdated;
use crate::infrastructure::metrics;

/// Default tick channel capacity.
pub const DEFAULT_UPDATES_CAPACITY: usize = 64;

/// Broadcast hub for rate update ticks.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use currency_rate_service::domain::streaming::RatesUpdated;
/// use currency_rate_service::infrastructure::broadcast::RateUpdateHub;
///
/// let hub = RateUpdateHub::new(16);
/// let mut rx = hub.subscribe();
///
/// let update = RatesUpdated { sequence: 1, at: Utc::now() };
/// assert_eq!(hub.send(update), Some(1));
/// assert_eq!(rx.try_recv().unwrap(), update);
/// ```
#[derive(Debug)]
pub struct RateUpdateHub {
    updates_tx: broadcast::Sender<RatesUpdated>,
}

impl RateUpdateHub {
    /// Create a hub whose channel holds `capacity` ticks.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            updates_tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Create a hub with the default capacity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_UPDATES_CAPACITY)
    }

    /// Send a tick to all receivers.
    ///
    /// Returns the number of receivers, or `None` if there are none.
    #[must_use]
    pub fn send(&self, update: RatesUpdated) -> Option<usize> {
        self.updates_tx.send(update).ok()
    }

    /// Get a new receiver. It sees only ticks sent after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RatesUpdated> {
        self.updates_tx.subscribe()
    }

    /// Number of live receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.updates_tx.receiver_count()
    }
}

impl Default for RateUpdateHub {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl UpdatePublisher for RateUpdateHub {
    fn publish(&self, update: RatesUpdated) -> usize {
        let receivers = self.send(update).unwrap_or(0);
        metrics::record_tick(receivers);
        receivers
    }
}

/// Shared hub reference.
pub type SharedRateUpdateHub = Arc<RateUpdateHub>;

// =============================================================================
// Tests
// =============================================================================
