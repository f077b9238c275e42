//! In-Memory Exchange Rates
//!
//! `RateSource` adapter backed by a table of EUR reference rates. Every
//! cross rate is derived from the table: `rate(base, destination) =
//! eur[destination] / eur[base]`.
//!
//! `refresh` moves each rate by a bounded random step so that subscribers
//! see changing values between ticks.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;

use crate::application::ports::{RateSource, RateSourceError};
use crate::domain::currency::{CurrencyCode, CurrencyPair};

/// Default relative step applied per refresh.
pub const DEFAULT_VOLATILITY: f64 = 0.05;

/// Approximate ECB euro reference rates (units per 1 EUR).
///
/// HRK and RUB are no longer published and have no entry.
const REFERENCE_RATES: &[(CurrencyCode, f64)] = &[
    (CurrencyCode::Usd, 1.0825),
    (CurrencyCode::Jpy, 161.42),
    (CurrencyCode::Bgn, 1.9558),
    (CurrencyCode::Czk, 25.218),
    (CurrencyCode::Dkk, 7.4598),
    (CurrencyCode::Gbp, 0.8547),
    (CurrencyCode::Huf, 395.63),
    (CurrencyCode::Pln, 4.3215),
    (CurrencyCode::Ron, 4.9748),
    (CurrencyCode::Sek, 11.482),
    (CurrencyCode::Chf, 0.9512),
    (CurrencyCode::Isk, 150.10),
    (CurrencyCode::Nok, 11.603),
    (CurrencyCode::Try, 35.012),
    (CurrencyCode::Aud, 1.6321),
    (CurrencyCode::Brl, 5.9104),
    (CurrencyCode::Cad, 1.4802),
    (CurrencyCode::Cny, 7.8233),
    (CurrencyCode::Hkd, 8.4526),
    (CurrencyCode::Idr, 17_512.0),
    (CurrencyCode::Ils, 4.0127),
    (CurrencyCode::Inr, 90.215),
    (CurrencyCode::Krw, 1_482.3),
    (CurrencyCode::Mxn, 19.534),
    (CurrencyCode::Myr, 5.0231),
    (CurrencyCode::Nzd, 1.7842),
    (CurrencyCode::Php, 62.104),
    (CurrencyCode::Sgd, 1.4527),
    (CurrencyCode::Thb, 38.561),
    (CurrencyCode::Zar, 20.017),
];

/// Errors building an `ExchangeRates` table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExchangeRatesError {
    /// A seed rate is not finite and positive.
    #[error("invalid seed rate {rate} for {currency}")]
    InvalidSeed {
        /// Currency with the bad seed.
        currency: CurrencyCode,
        /// The rejected value.
        rate: f64,
    },

    /// Volatility must be in `[0, 1)`.
    #[error("volatility must be in [0, 1), got {0}")]
    InvalidVolatility(f64),
}

/// EUR-based exchange rate table.
#[derive(Debug)]
pub struct ExchangeRates {
    eur_rates: RwLock<HashMap<CurrencyCode, f64>>,
    volatility: f64,
}

impl ExchangeRates {
    /// Build a table from EUR rates. EUR itself is always 1.0.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-finite or non-positive seed, or a
    /// volatility outside `[0, 1)`.
    pub fn new(
        seed: impl IntoIterator<Item = (CurrencyCode, f64)>,
        volatility: f64,
    ) -> Result<Self, ExchangeRatesError> {
        if !(0.0..1.0).contains(&volatility) {
            return Err(ExchangeRatesError::InvalidVolatility(volatility));
        }

        let mut eur_rates = HashMap::new();
        for (currency, rate) in seed {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ExchangeRatesError::InvalidSeed { currency, rate });
            }
            eur_rates.insert(currency, rate);
        }
        eur_rates.insert(CurrencyCode::Eur, 1.0);

        Ok(Self {
            eur_rates: RwLock::new(eur_rates),
            volatility,
        })
    }

    /// Build a table from the bundled reference rates.
    ///
    /// # Errors
    ///
    /// Returns an error if `volatility` is outside `[0, 1)`.
    pub fn with_reference_rates(volatility: f64) -> Result<Self, ExchangeRatesError> {
        Self::new(REFERENCE_RATES.iter().copied(), volatility)
    }

    /// Units of `currency` per 1 EUR.
    fn eur_rate(&self, currency: CurrencyCode) -> Result<f64, RateSourceError> {
        self.eur_rates
            .read()
            .get(&currency)
            .copied()
            .ok_or(RateSourceError::RateUnavailable(currency))
    }

    /// Cross rate for a pair without going through the async port.
    ///
    /// # Errors
    ///
    /// Returns `RateUnavailable` if either side has no entry.
    pub fn cross_rate(&self, pair: CurrencyPair) -> Result<f64, RateSourceError> {
        let base = self.eur_rate(pair.base())?;
        let destination = self.eur_rate(pair.destination())?;
        Ok(destination / base)
    }

    /// Currencies with data.
    #[must_use]
    pub fn currencies(&self) -> Vec<CurrencyCode> {
        let mut codes: Vec<_> = self.eur_rates.read().keys().copied().collect();
        codes.sort_unstable();
        codes
    }

    fn random_walk(&self) -> Result<(), RateSourceError> {
        if self.volatility <= 0.0 {
            return Ok(());
        }

        let mut rng = rand::rng();
        let volatility = self.volatility;
        self.walk(|| rng.random_range(-volatility..=volatility))
    }

    /// Scale every non-EUR rate by `1 + step()`.
    ///
    /// The table is replaced only when every new rate is valid; on error it
    /// is left untouched.
    fn walk(&self, mut step: impl FnMut() -> f64) -> Result<(), RateSourceError> {
        let mut rates = self.eur_rates.write();
        let mut next = HashMap::with_capacity(rates.len());

        for (&currency, &rate) in rates.iter() {
            let moved = if currency == CurrencyCode::Eur {
                rate
            } else {
                rate * (1.0 + step())
            };
            if !moved.is_finite() || moved <= 0.0 {
                return Err(RateSourceError::InvalidRate {
                    currency,
                    rate: moved,
                });
            }
            next.insert(currency, moved);
        }

        *rates = next;
        Ok(())
    }
}

#[async_trait]
impl RateSource for ExchangeRates {
    async fn rate(&self, pair: CurrencyPair) -> Result<f64, RateSourceError> {
        self.cross_rate(pair)
    }

    async fn refresh(&self) -> Result<(), RateSourceError> {
        self.random_walk()
    }
}

// =============================================================================
// Tests
// =============================================================================
