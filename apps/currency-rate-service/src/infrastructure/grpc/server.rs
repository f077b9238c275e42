//! gRPC Server Implementation
//!
//! Implements the generated `Currency` service trait.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

use super::proto::currency::v1::{RateRequest, RateResponse, currency_server::Currency};
use super::retry::ReadRetryConfig;
use super::stream::{StreamContext, open_stream, rate_response};
use crate::application::services::{RateLookupError, RateService};
use crate::domain::currency::CurrencyCode;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::broadcast::SharedRateUpdateHub;
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics::{self, Outcome};

// =============================================================================
// Type Aliases
// =============================================================================

type StreamResult<T> = Result<Response<T>, Status>;
type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the gRPC server.
#[derive(Debug, Clone)]
pub struct CurrencyServiceConfig {
    /// Service version string.
    pub version: String,
    /// Outbound messages buffered per subscription stream.
    pub outbound_buffer: usize,
    /// Backoff after failed stream reads.
    pub read_retry: ReadRetryConfig,
}

impl Default for CurrencyServiceConfig {
    fn default() -> Self {
        Self::from(&StreamSettings::default())
    }
}

impl From<&StreamSettings> for CurrencyServiceConfig {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            outbound_buffer: settings.outbound_buffer,
            read_retry: settings.read_retry,
        }
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

/// gRPC currency service.
#[derive(Debug)]
pub struct CurrencyService {
    config: CurrencyServiceConfig,
    rates: RateService,
    streams: StreamContext,
    started_at: Instant,
}

impl CurrencyService {
    /// Create the service.
    ///
    /// Streams opened by this service stop when `shutdown` is cancelled.
    #[must_use]
    pub fn new(
        config: CurrencyServiceConfig,
        rates: RateService,
        hub: SharedRateUpdateHub,
        registry: Arc<SubscriptionRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        let streams = StreamContext {
            registry,
            rates: rates.clone(),
            hub,
            read_retry: config.read_retry,
            outbound_buffer: config.outbound_buffer,
            shutdown,
            active_streams: Arc::new(AtomicI64::new(0)),
        };

        Self {
            config,
            rates,
            streams,
            started_at: Instant::now(),
        }
    }

    /// Shared subscription registry.
    #[must_use]
    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        Arc::clone(&self.streams.registry)
    }

    /// Counter of open subscription streams.
    #[must_use]
    pub fn active_streams(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.streams.active_streams)
    }

    /// Number of open subscription streams.
    #[must_use]
    pub fn active_stream_count(&self) -> i64 {
        self.streams.active_streams.load(Ordering::Relaxed)
    }

    /// Service version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// Time since the service was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[tonic::async_trait]
impl Currency for CurrencyService {
    type SubscribeRatesStream = BoxedStream<RateResponse>;

    async fn get_rate(&self, request: Request<RateRequest>) -> Result<Response<RateResponse>, Status> {
        let req = request.into_inner();

        let (base, destination) = match decode_pair(&req) {
            Ok(codes) => codes,
            Err(status) => {
                tracing::warn!(
                    base = req.base,
                    destination = req.destination,
                    "Rejected GetRate with unknown currency"
                );
                metrics::record_rate_request(Outcome::InvalidRequest);
                return Err(status);
            }
        };

        match self.rates.get_rate(base, destination).await {
            Ok(quote) => {
                metrics::record_rate_request(Outcome::Ok);
                Ok(Response::new(rate_response(&quote)))
            }
            Err(e) => {
                metrics::record_rate_request(outcome_for(&e));
                tracing::warn!(base = %base, destination = %destination, error = %e, "GetRate failed");
                Err(e.into())
            }
        }
    }

    async fn subscribe_rates(
        &self,
        request: Request<Streaming<RateRequest>>,
    ) -> StreamResult<Self::SubscribeRatesStream> {
        let inbound = request.into_inner();
        let client = uuid::Uuid::new_v4().as_u64_pair().0;

        let (outbound, _handles) = open_stream(&self.streams, client, inbound);

        Ok(Response::new(Box::pin(outbound) as Self::SubscribeRatesStream))
    }
}

// =============================================================================
// Conversion Helpers
// =============================================================================

fn decode_pair(req: &RateRequest) -> Result<(CurrencyCode, CurrencyCode), Status> {
    let base = CurrencyCode::from_id(req.base)
        .map_err(|e| Status::invalid_argument(format!("base: {e}")))?;
    let destination = CurrencyCode::from_id(req.destination)
        .map_err(|e| Status::invalid_argument(format!("destination: {e}")))?;
    Ok((base, destination))
}

const fn outcome_for(error: &RateLookupError) -> Outcome {
    match error {
        RateLookupError::InvalidRequest(_) => Outcome::InvalidRequest,
        RateLookupError::RateUnavailable(_) => Outcome::RateUnavailable,
    }
}

impl From<RateLookupError> for Status {
    fn from(error: RateLookupError) -> Self {
        match error {
            RateLookupError::InvalidRequest(e) => Self::invalid_argument(e.to_string()),
            RateLookupError::RateUnavailable(e) => Self::not_found(e.to_string()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
