//! gRPC Currency Server
//!
//! Implements the `currency.v1.Currency` service.
//!
//! # Architecture
//!
//! - `GetRate` validates the pair and answers from the rate source
//! - `SubscribeRates` hands the call to the stream pump (`stream`), which
//!   runs a reader and a sender per client and pushes rates on every
//!   `RatesUpdated` tick from the broadcast hub
//! - `retry` holds the backoff applied after failed stream reads

pub mod retry;
pub mod server;
pub mod stream;

// Allow clippy warnings and missing docs in generated code
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto {
    pub mod currency {
        pub mod v1 {
            include!(concat!(env!("OUT_DIR"), "/currency.v1.rs"));
        }
    }
}

/// Encoded file descriptor set for server reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/currency_descriptor.bin"));

pub use server::{CurrencyService, CurrencyServiceConfig};
