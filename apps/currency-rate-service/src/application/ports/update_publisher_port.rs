//! Update Publisher Port (Driven Port)
//!
//! Interface for announcing that rates were recomputed.

use crate::domain::streaming::RatesUpdated;

/// Port for fanning out rate update ticks.
pub trait UpdatePublisher: Send + Sync {
    /// Publish a tick. Returns the number of subscribers that will see it.
    fn publish(&self, update: RatesUpdated) -> usize;
}

/// No-op publisher for testing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpUpdatePublisher;

impl UpdatePublisher for NoOpUpdatePublisher {
    fn publish(&self, _update: RatesUpdated) -> usize {
        0
    }
}
