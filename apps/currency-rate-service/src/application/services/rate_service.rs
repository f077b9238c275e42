//! Rate Service
//!
//! Validated rate lookups against the `RateSource` port.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::application::ports::{RateSource, RateSourceError};
use crate::domain::currency::{CurrencyCode, CurrencyError, CurrencyPair};
use crate::domain::streaming::RateQuote;

/// Rate lookup errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateLookupError {
    /// Unknown currency or base equal to destination.
    #[error("invalid rate request: {0}")]
    InvalidRequest(#[from] CurrencyError),

    /// The rate source has no usable rate for the pair.
    #[error("rate unavailable: {0}")]
    RateUnavailable(#[from] RateSourceError),
}

/// Answers rate lookups for unary calls and subscription pushes.
#[derive(Clone)]
pub struct RateService {
    source: Arc<dyn RateSource>,
}

impl std::fmt::Debug for RateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateService").finish_non_exhaustive()
    }
}

impl RateService {
    /// Create a service over a rate source.
    #[must_use]
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        Self { source }
    }

    /// Handle a unary rate request.
    ///
    /// The request is logged before validation. A same-currency request is
    /// rejected without consulting the rate source.
    ///
    /// # Errors
    ///
    /// Returns `RateLookupError::InvalidRequest` when base equals destination
    /// and `RateLookupError::RateUnavailable` when the source has no data.
    pub async fn get_rate(
        &self,
        base: CurrencyCode,
        destination: CurrencyCode,
    ) -> Result<RateQuote, RateLookupError> {
        tracing::info!(base = %base, destination = %destination, "Handle request for GetRate");

        let pair = CurrencyPair::new(base, destination)?;
        self.quote(pair).await
    }

    /// Read the current rate for an already validated pair.
    ///
    /// # Errors
    ///
    /// Returns `RateLookupError::RateUnavailable` when the source has no
    /// finite, positive rate for the pair.
    pub async fn quote(&self, pair: CurrencyPair) -> Result<RateQuote, RateLookupError> {
        let rate = self.source.rate(pair).await?;

        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateSourceError::InvalidRate {
                currency: pair.destination(),
                rate,
            }
            .into());
        }

        Ok(RateQuote {
            pair,
            rate,
            at: Utc::now(),
        })
    }
}
