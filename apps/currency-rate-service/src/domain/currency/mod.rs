//! Currency Types
//!
//! The closed set of supported currency codes and the currency pair used by
//! both rate lookups and subscriptions.
//!
//! Codes carry a stable numeric id that matches the `Currencies` enum on the
//! wire, so conversions at the gRPC boundary never go through strings.

use std::fmt;
use std::str::FromStr;

// =============================================================================
// Currency Code
// =============================================================================

macro_rules! currency_codes {
    ($($variant:ident => $symbol:literal = $id:literal),+ $(,)?) => {
        /// Supported ISO 4217 currency code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum CurrencyCode {
            $(
                #[doc = concat!("`", $symbol, "`")]
                $variant,
            )+
        }

        impl CurrencyCode {
            /// Every supported currency, ordered by wire id.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// ISO symbol, e.g. `"EUR"`.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $symbol,)+
                }
            }

            /// Stable numeric id used on the wire.
            #[must_use]
            pub const fn id(self) -> i32 {
                match self {
                    $(Self::$variant => $id,)+
                }
            }

            /// Look up a currency by its wire id.
            ///
            /// # Errors
            ///
            /// Returns `CurrencyError::UnknownCurrency` for ids outside the
            /// supported set.
            pub fn from_id(id: i32) -> Result<Self, CurrencyError> {
                match id {
                    $($id => Ok(Self::$variant),)+
                    other => Err(CurrencyError::UnknownCurrency(other.to_string())),
                }
            }
        }

        impl FromStr for CurrencyCode {
            type Err = CurrencyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_uppercase().as_str() {
                    $($symbol => Ok(Self::$variant),)+
                    _ => Err(CurrencyError::UnknownCurrency(s.to_string())),
                }
            }
        }
    };
}

currency_codes! {
    Eur => "EUR" = 0,
    Usd => "USD" = 1,
    Jpy => "JPY" = 2,
    Bgn => "BGN" = 3,
    Czk => "CZK" = 4,
    Dkk => "DKK" = 5,
    Gbp => "GBP" = 6,
    Huf => "HUF" = 7,
    Pln => "PLN" = 8,
    Ron => "RON" = 9,
    Sek => "SEK" = 10,
    Chf => "CHF" = 11,
    Isk => "ISK" = 12,
    Nok => "NOK" = 13,
    Hrk => "HRK" = 14,
    Rub => "RUB" = 15,
    Try => "TRY" = 16,
    Aud => "AUD" = 17,
    Brl => "BRL" = 18,
    Cad => "CAD" = 19,
    Cny => "CNY" = 20,
    Hkd => "HKD" = 21,
    Idr => "IDR" = 22,
    Ils => "ILS" = 23,
    Inr => "INR" = 24,
    Krw => "KRW" = 25,
    Mxn => "MXN" = 26,
    Myr => "MYR" = 27,
    Nzd => "NZD" = 28,
    Php => "PHP" = 29,
    Sgd => "SGD" = 30,
    Thb => "THB" = 31,
    Zar => "ZAR" = 32,
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Currency Pair
// =============================================================================

/// A validated `(base, destination)` pair.
///
/// 1 unit of `base` is worth `rate` units of `destination`. A currency is
/// never paired with itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurrencyPair {
    base: CurrencyCode,
    destination: CurrencyCode,
}

impl CurrencyPair {
    /// Create a pair.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyError::SameCurrency` when base and destination match.
    pub fn new(base: CurrencyCode, destination: CurrencyCode) -> Result<Self, CurrencyError> {
        if base == destination {
            return Err(CurrencyError::SameCurrency(base));
        }
        Ok(Self { base, destination })
    }

    /// Create a pair from wire ids.
    ///
    /// # Errors
    ///
    /// Returns an error if either id is unknown or both ids are equal.
    pub fn from_ids(base: i32, destination: i32) -> Result<Self, CurrencyError> {
        Self::new(CurrencyCode::from_id(base)?, CurrencyCode::from_id(destination)?)
    }

    /// Base currency.
    #[must_use]
    pub const fn base(&self) -> CurrencyCode {
        self.base
    }

    /// Destination currency.
    #[must_use]
    pub const fn destination(&self) -> CurrencyCode {
        self.destination
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.destination)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while validating currencies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurrencyError {
    /// The code is not in the supported set.
    #[error("unsupported currency: {0}")]
    UnknownCurrency(String),
    /// Base and destination are the same currency.
    #[error("base and destination are both {0}, no conversion needed")]
    SameCurrency(CurrencyCode),
}

// =============================================================================
// Tests
// =============================================================================
