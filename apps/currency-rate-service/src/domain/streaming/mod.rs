//! Rate streaming types: quotes pushed to clients and the ticks that
//! trigger them.

use chrono::{DateTime, Utc};

use super::currency::CurrencyPair;

/// A rate for one pair at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateQuote {
    /// The quoted pair.
    pub pair: CurrencyPair,
    /// 1 unit of base = `rate` units of destination.
    pub rate: f64,
    /// When the rate was read.
    pub at: DateTime<Utc>,
}

/// Notification that the rate source recomputed its rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatesUpdated {
    /// Monotonic tick counter, starting at 1.
    pub sequence: u64,
    /// When the refresh completed.
    pub at: DateTime<Utc>,
}
