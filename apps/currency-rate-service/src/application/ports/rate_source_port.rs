//! Rate Source Port (Driven Port)
//!
//! Interface to the collaborator that knows current exchange rates.

use async_trait::async_trait;

use crate::domain::currency::{CurrencyCode, CurrencyPair};

/// Rate source error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateSourceError {
    /// The source has no data for a currency.
    #[error("no rate data for {0}")]
    RateUnavailable(CurrencyCode),

    /// The source holds a rate that is not finite and positive.
    #[error("invalid rate {rate} for {currency}")]
    InvalidRate {
        /// Currency with the bad rate.
        currency: CurrencyCode,
        /// The rejected value.
        rate: f64,
    },

    /// Recomputing rates failed.
    #[error("rate refresh failed: {message}")]
    RefreshFailed {
        /// Error details.
        message: String,
    },
}

/// Port for reading and recomputing exchange rates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Current rate for a pair: 1 unit of base in units of destination.
    async fn rate(&self, pair: CurrencyPair) -> Result<f64, RateSourceError>;

    /// Recompute rates. Called once per monitor tick.
    async fn refresh(&self) -> Result<(), RateSourceError>;
}
