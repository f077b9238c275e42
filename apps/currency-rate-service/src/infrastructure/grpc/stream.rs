//! Subscription Stream Pump
//!
//! Runs one `SubscribeRates` call. Each call gets two tasks:
//!
//! - the **reader** drains inbound `RateRequest`s and appends valid pairs to
//!   the client's registry entry
//! - the **sender** waits for rate update ticks and pushes one
//!   `RateResponse` per subscribed pair
//!
//! The two halves progress independently. The client ending its request
//! stream stops only the reader; pushes continue until the client goes away,
//! a send fails, reads fail persistently, or the server shuts down.
//!
//! # Lifecycle
//!
//! ```text
//! open_stream ──► register (guard) ──► spawn reader + sender ──► Streaming
//!                                                                  │
//!     sender exit (send failed / client gone / shutdown) ──────────┤
//!     reader gives up after repeated read errors ──► cancel ───────┤
//!                                                                  ▼
//!                                        guard dropped, entry removed (Closed)
//! ```
//!
//! The sender task owns the `SubscriptionGuard` and a drop guard for the
//! stream's cancellation token, so the registry entry is freed and the
//! reader is stopped on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use prost_types::Timestamp;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;

use super::proto::currency::v1::{RateRequest, RateResponse};
use super::retry::{ReadRetryConfig, ReadRetryPolicy};
use crate::application::services::RateService;
use crate::domain::currency::CurrencyPair;
use crate::domain::streaming::{RateQuote, RatesUpdated};
use crate::domain::subscription::{ClientId, SubscriptionRegistry};
use crate::infrastructure::broadcast::SharedRateUpdateHub;
use crate::infrastructure::metrics::{self, Outcome};

/// Outbound half of a subscription stream.
pub type Outbound = mpsc::Sender<Result<RateResponse, Status>>;

// =============================================================================
// Outcomes
// =============================================================================

/// Why a reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The client closed its request stream.
    EndOfInput,
    /// Consecutive read errors reached the retry cap.
    RetriesExhausted,
    /// The stream was cancelled (sender exit or shutdown).
    Cancelled,
    /// The client's registry entry no longer exists.
    Unregistered,
}

/// Summary of a finished reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOutcome {
    /// Valid subscription requests appended to the registry.
    pub processed: usize,
    /// Requests rejected as invalid.
    pub rejected: usize,
    /// Transport read errors seen.
    pub read_errors: u32,
    /// Exit reason.
    pub exit: ReaderExit,
}

/// Why a sender stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderExit {
    /// Sending a rate update failed; the call ends with that failure.
    SendFailed,
    /// The outbound receiver was dropped before a send was attempted.
    ClientGone,
    /// The tick channel closed.
    UpdatesClosed,
    /// The stream was cancelled (read retries exhausted or shutdown).
    Cancelled,
}

/// Summary of a finished sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderOutcome {
    /// Ticks handled.
    pub ticks: u64,
    /// Rate updates sent.
    pub pushes: u64,
    /// Exit reason.
    pub exit: SenderExit,
}

// =============================================================================
// Reader
// =============================================================================

/// Read subscription requests until end-of-input, cancellation, or the
/// retry cap.
///
/// Exhausting read retries cancels `cancel`, which stops the sender.
pub async fn run_reader<S>(
    client: ClientId,
    mut inbound: S,
    registry: Arc<SubscriptionRegistry>,
    retry: ReadRetryConfig,
    cancel: CancellationToken,
) -> ReaderOutcome
where
    S: Stream<Item = Result<RateRequest, Status>> + Unpin + Send,
{
    let mut policy = ReadRetryPolicy::new(retry);
    let mut outcome = ReaderOutcome {
        processed: 0,
        rejected: 0,
        read_errors: 0,
        exit: ReaderExit::Cancelled,
    };

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = inbound.next() => next,
        };

        match next {
            None => {
                tracing::info!(client, "Client has closed request stream");
                outcome.exit = ReaderExit::EndOfInput;
                break;
            }
            Some(Err(status)) => {
                outcome.read_errors += 1;
                metrics::record_stream_read_error();
                tracing::error!(client, error = %status, "Unable to read from client");

                let Some(delay) = policy.next_delay() else {
                    tracing::error!(
                        client,
                        attempts = policy.failures(),
                        "Read retries exhausted, closing stream"
                    );
                    outcome.exit = ReaderExit::RetriesExhausted;
                    cancel.cancel();
                    break;
                };

                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
            Some(Ok(request)) => {
                policy.reset();

                match CurrencyPair::from_ids(request.base, request.destination) {
                    Ok(pair) => {
                        let Some(count) = registry.subscribe(client, pair) else {
                            outcome.exit = ReaderExit::Unregistered;
                            break;
                        };
                        outcome.processed += 1;
                        metrics::record_subscription(Outcome::Ok);
                        tracing::debug!(client, pair = %pair, subscriptions = count, "Subscribed");
                    }
                    Err(e) => {
                        outcome.rejected += 1;
                        metrics::record_subscription(Outcome::InvalidRequest);
                        tracing::warn!(
                            client,
                            base = request.base,
                            destination = request.destination,
                            error = %e,
                            "Rejected subscription request"
                        );
                    }
                }
            }
        }
    }

    outcome
}

// =============================================================================
// Sender
// =============================================================================

/// Push current rates for the client's pairs on every tick.
///
/// The registry is read as a snapshot; no lock is held while quoting or
/// sending. A failed quote skips that pair. A failed send ends the sender.
pub async fn run_sender(
    client: ClientId,
    registry: Arc<SubscriptionRegistry>,
    rates: RateService,
    mut updates: broadcast::Receiver<RatesUpdated>,
    outbound: Outbound,
    cancel: CancellationToken,
) -> SenderOutcome {
    let mut outcome = SenderOutcome {
        ticks: 0,
        pushes: 0,
        exit: SenderExit::Cancelled,
    };

    loop {
        let update = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = outbound.closed() => {
                outcome.exit = SenderExit::ClientGone;
                break;
            }
            update = updates.recv() => update,
        };

        match update {
            Ok(tick) => {
                outcome.ticks += 1;
                let (sent, stopped) =
                    push_rates(client, &registry, &rates, &outbound, &cancel).await;
                outcome.pushes += sent;
                metrics::record_pushes(sent);
                if let Some(exit) = stopped {
                    outcome.exit = exit;
                    break;
                }
                tracing::trace!(client, sequence = tick.sequence, sent, "Pushed rates");
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(client, lagged = n, "Rate update receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                outcome.exit = SenderExit::UpdatesClosed;
                break;
            }
        }
    }

    outcome
}

/// Send one update per active pair.
///
/// Returns the number of updates sent, plus the exit reason if the sender
/// must stop. Updates sent before a failure are still counted.
async fn push_rates(
    client: ClientId,
    registry: &SubscriptionRegistry,
    rates: &RateService,
    outbound: &Outbound,
    cancel: &CancellationToken,
) -> (u64, Option<SenderExit>) {
    let mut sent = 0;

    for pair in registry.active_pairs(client) {
        let quote = match rates.quote(pair).await {
            Ok(quote) => quote,
            Err(e) => {
                tracing::warn!(client, pair = %pair, error = %e, "Skipping rate update");
                continue;
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => return (sent, Some(SenderExit::Cancelled)),
            result = outbound.send(Ok(rate_response(&quote))) => {
                if result.is_err() {
                    tracing::warn!(client, pair = %pair, "Unable to send rate update");
                    return (sent, Some(SenderExit::SendFailed));
                }
            }
        }
        sent += 1;
    }

    (sent, None)
}

// =============================================================================
// Stream Wiring
// =============================================================================

/// Shared dependencies for opening subscription streams.
#[derive(Debug, Clone)]
pub struct StreamContext {
    /// Per-client subscriptions.
    pub registry: Arc<SubscriptionRegistry>,
    /// Rate lookups for pushes.
    pub rates: RateService,
    /// Tick source.
    pub hub: SharedRateUpdateHub,
    /// Reader backoff settings.
    pub read_retry: ReadRetryConfig,
    /// Outbound messages buffered per stream.
    pub outbound_buffer: usize,
    /// Server-wide shutdown; each stream uses a child token.
    pub shutdown: CancellationToken,
    /// Open stream counter.
    pub active_streams: Arc<AtomicI64>,
}

/// Task handles for one open stream.
#[derive(Debug)]
pub struct StreamHandles {
    /// The reader task.
    pub reader: JoinHandle<ReaderOutcome>,
    /// The sender task; the client's registry entry lives until it ends.
    pub sender: JoinHandle<SenderOutcome>,
}

/// Register a client and start its reader and sender.
///
/// Returns the outbound stream to hand to the transport.
pub fn open_stream<S>(
    ctx: &StreamContext,
    client: ClientId,
    inbound: S,
) -> (ReceiverStream<Result<RateResponse, Status>>, StreamHandles)
where
    S: Stream<Item = Result<RateRequest, Status>> + Unpin + Send + 'static,
{
    let guard = ctx.registry.register(client);
    let cancel = ctx.shutdown.child_token();
    let updates = ctx.hub.subscribe();
    let (tx, rx) = mpsc::channel(ctx.outbound_buffer.max(1));

    let open = ctx.active_streams.fetch_add(1, Ordering::Relaxed) + 1;
    #[allow(clippy::cast_precision_loss)]
    metrics::set_active_streams(open as f64);
    tracing::info!(client, active_streams = open, "Subscription stream opened");

    let reader = tokio::spawn({
        let registry = Arc::clone(&ctx.registry);
        let retry = ctx.read_retry;
        let cancel = cancel.clone();
        async move {
            let outcome = run_reader(client, inbound, registry, retry, cancel).await;
            tracing::debug!(
                client,
                processed = outcome.processed,
                rejected = outcome.rejected,
                exit = ?outcome.exit,
                "Reader finished"
            );
            outcome
        }
    });

    let sender = tokio::spawn({
        let registry = Arc::clone(&ctx.registry);
        let rates = ctx.rates.clone();
        let active_streams = Arc::clone(&ctx.active_streams);
        async move {
            let _guard = guard;
            let _stop_reader = cancel.clone().drop_guard();

            let outcome = run_sender(client, registry, rates, updates, tx, cancel).await;

            let open = active_streams.fetch_sub(1, Ordering::Relaxed) - 1;
            #[allow(clippy::cast_precision_loss)]
            metrics::set_active_streams(open as f64);
            tracing::info!(
                client,
                pushes = outcome.pushes,
                exit = ?outcome.exit,
                active_streams = open,
                "Subscription stream closed"
            );
            outcome
        }
    });

    (ReceiverStream::new(rx), StreamHandles { reader, sender })
}

// =============================================================================
// Conversions
// =============================================================================

/// Convert a quote to its wire form.
#[must_use]
pub fn rate_response(quote: &RateQuote) -> RateResponse {
    RateResponse {
        base: quote.pair.base().id(),
        destination: quote.pair.destination().id(),
        rate: quote.rate,
        updated_at: Some(datetime_to_timestamp(quote.at)),
    }
}

/// Convert a UTC time to a protobuf timestamp.
#[must_use]
pub fn datetime_to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: i32::try_from(dt.timestamp_subsec_nanos()).unwrap_or(i32::MAX),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::application::ports::{MockRateSource, RateSourceError};
    use crate::domain::currency::CurrencyCode;
    use crate::infrastructure::broadcast::RateUpdateHub;

    const CLIENT: ClientId = 42;

    fn request(base: CurrencyCode, destination: CurrencyCode) -> Result<RateRequest, Status> {
        Ok(RateRequest {
            base: base.id(),
            destination: destination.id(),
        })
    }

    fn pair(base: CurrencyCode, destination: CurrencyCode) -> CurrencyPair {
        CurrencyPair::new(base, destination).unwrap()
    }

    fn fixed_rates(rate: f64) -> RateService {
        let mut source = MockRateSource::new();
        source.expect_rate().returning(move |_| Ok(rate));
        RateService::new(Arc::new(source))
    }

    fn no_retry() -> ReadRetryConfig {
        ReadRetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            jitter_factor: 0.0,
            max_attempts: 2,
            ..ReadRetryConfig::default()
        }
    }

    fn tick(sequence: u64) -> RatesUpdated {
        RatesUpdated {
            sequence,
            at: Utc::now(),
        }
    }

    fn context(rates: RateService) -> StreamContext {
        StreamContext {
            registry: Arc::new(SubscriptionRegistry::new()),
            rates,
            hub: Arc::new(RateUpdateHub::new(16)),
            read_retry: no_retry(),
            outbound_buffer: 16,
            shutdown: CancellationToken::new(),
            active_streams: Arc::new(AtomicI64::new(0)),
        }
    }

    // -------------------------------------------------------------------------
    // Reader
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn reader_processes_all_requests_before_end_of_input() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _guard = registry.register(CLIENT);
        let requests = vec![
            request(CurrencyCode::Usd, CurrencyCode::Eur),
            request(CurrencyCode::Gbp, CurrencyCode::Jpy),
            request(CurrencyCode::Usd, CurrencyCode::Eur),
        ];

        let outcome = run_reader(
            CLIENT,
            tokio_stream::iter(requests),
            Arc::clone(&registry),
            no_retry(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.exit, ReaderExit::EndOfInput);
        assert_eq!(
            registry.subscriptions(CLIENT),
            vec![
                pair(CurrencyCode::Usd, CurrencyCode::Eur),
                pair(CurrencyCode::Gbp, CurrencyCode::Jpy),
                pair(CurrencyCode::Usd, CurrencyCode::Eur),
            ]
        );
    }

    #[tokio::test]
    async fn reader_rejects_invalid_pairs() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _guard = registry.register(CLIENT);
        let requests = vec![
            request(CurrencyCode::Usd, CurrencyCode::Usd),
            Ok(RateRequest {
                base: 99,
                destination: 0,
            }),
            request(CurrencyCode::Chf, CurrencyCode::Sek),
        ];

        let outcome = run_reader(
            CLIENT,
            tokio_stream::iter(requests),
            Arc::clone(&registry),
            no_retry(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.rejected, 2);
        assert_eq!(
            registry.subscriptions(CLIENT),
            vec![pair(CurrencyCode::Chf, CurrencyCode::Sek)]
        );
    }

    #[tokio::test]
    async fn reader_retries_transient_errors() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _guard = registry.register(CLIENT);
        let requests = vec![
            Err(Status::unavailable("blip")),
            request(CurrencyCode::Usd, CurrencyCode::Eur),
            Err(Status::unavailable("blip")),
            request(CurrencyCode::Eur, CurrencyCode::Usd),
        ];
        let cancel = CancellationToken::new();

        let outcome = run_reader(
            CLIENT,
            tokio_stream::iter(requests),
            Arc::clone(&registry),
            no_retry(),
            cancel.clone(),
        )
        .await;

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.read_errors, 2);
        assert_eq!(outcome.exit, ReaderExit::EndOfInput);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn reader_gives_up_and_cancels_stream() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _guard = registry.register(CLIENT);
        let failing = tokio_stream::iter(
            (0..10).map(|_| Err::<RateRequest, _>(Status::internal("broken"))),
        );
        let cancel = CancellationToken::new();

        let outcome = run_reader(CLIENT, failing, registry, no_retry(), cancel.clone()).await;

        assert_eq!(outcome.exit, ReaderExit::RetriesExhausted);
        assert_eq!(outcome.read_errors, 3);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn reader_stops_on_cancel() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _guard = registry.register(CLIENT);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = run_reader(
            CLIENT,
            tokio_stream::pending::<Result<RateRequest, Status>>(),
            registry,
            no_retry(),
            cancel,
        )
        .await;

        assert_eq!(outcome.exit, ReaderExit::Cancelled);
    }

    #[tokio::test]
    async fn reader_stops_when_unregistered() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let requests = vec![request(CurrencyCode::Usd, CurrencyCode::Eur)];

        let outcome = run_reader(
            CLIENT,
            tokio_stream::iter(requests),
            registry,
            no_retry(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.exit, ReaderExit::Unregistered);
        assert_eq!(outcome.processed, 0);
    }

    // -------------------------------------------------------------------------
    // Sender
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn sender_pushes_one_update_per_distinct_pair() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _guard = registry.register(CLIENT);
        registry.subscribe(CLIENT, pair(CurrencyCode::Usd, CurrencyCode::Eur));
        registry.subscribe(CLIENT, pair(CurrencyCode::Gbp, CurrencyCode::Usd));
        registry.subscribe(CLIENT, pair(CurrencyCode::Usd, CurrencyCode::Eur));

        let hub = RateUpdateHub::new(4);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let sender = tokio::spawn(run_sender(
            CLIENT,
            Arc::clone(&registry),
            fixed_rates(1.5),
            hub.subscribe(),
            tx,
            cancel.clone(),
        ));

        let _ = hub.send(tick(1));

        let first = rx.recv().await.unwrap().unwrap();
        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(
            (first.base, first.destination),
            (CurrencyCode::Usd.id(), CurrencyCode::Eur.id())
        );
        assert_eq!(
            (second.base, second.destination),
            (CurrencyCode::Gbp.id(), CurrencyCode::Usd.id())
        );
        assert!((first.rate - 1.5).abs() < f64::EPSILON);
        assert!(first.updated_at.is_some());

        cancel.cancel();
        let outcome = sender.await.unwrap();
        assert_eq!(outcome.pushes, 2);
        assert_eq!(outcome.ticks, 1);
        assert_eq!(outcome.exit, SenderExit::Cancelled);
    }

    #[tokio::test]
    async fn sender_skips_unavailable_pairs() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _guard = registry.register(CLIENT);
        registry.subscribe(CLIENT, pair(CurrencyCode::Usd, CurrencyCode::Rub));
        registry.subscribe(CLIENT, pair(CurrencyCode::Usd, CurrencyCode::Eur));

        let mut source = MockRateSource::new();
        source.expect_rate().returning(|pair| {
            if pair.destination() == CurrencyCode::Rub {
                Err(RateSourceError::RateUnavailable(CurrencyCode::Rub))
            } else {
                Ok(0.9)
            }
        });

        let hub = RateUpdateHub::new(4);
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let sender = tokio::spawn(run_sender(
            CLIENT,
            registry,
            RateService::new(Arc::new(source)),
            hub.subscribe(),
            tx,
            cancel.clone(),
        ));

        let _ = hub.send(tick(1));

        let only = rx.recv().await.unwrap().unwrap();
        assert_eq!(only.destination, CurrencyCode::Eur.id());

        cancel.cancel();
        assert_eq!(sender.await.unwrap().pushes, 1);
    }

    #[tokio::test]
    async fn sender_stops_after_client_goes_away() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let _guard = registry.register(CLIENT);
        registry.subscribe(CLIENT, pair(CurrencyCode::Usd, CurrencyCode::Eur));

        let hub = RateUpdateHub::new(4);
        let (tx, mut rx) = mpsc::channel(8);
        let sender = tokio::spawn(run_sender(
            CLIENT,
            registry,
            fixed_rates(1.1),
            hub.subscribe(),
            tx,
            CancellationToken::new(),
        ));

        let _ = hub.send(tick(1));
        assert!(rx.recv().await.is_some());

        drop(rx);
        let _ = hub.send(tick(2));

        let outcome = timeout(Duration::from_secs(1), sender).await.unwrap().unwrap();
        assert_eq!(outcome.pushes, 1);
        assert_eq!(outcome.exit, SenderExit::ClientGone);
    }

    #[tokio::test]
    async fn sender_exits_when_updates_close() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let hub = RateUpdateHub::new(4);
        let updates = hub.subscribe();
        drop(hub);
        let (tx, _rx) = mpsc::channel(1);

        let outcome = run_sender(
            CLIENT,
            registry,
            fixed_rates(1.0),
            updates,
            tx,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.exit, SenderExit::UpdatesClosed);
    }

    // -------------------------------------------------------------------------
    // Stream wiring
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn end_of_input_keeps_pushes_flowing() {
        let ctx = context(fixed_rates(2.0));
        let inbound = tokio_stream::iter(vec![request(CurrencyCode::Usd, CurrencyCode::Eur)]);

        let (mut outbound, handles) = open_stream(&ctx, CLIENT, inbound);

        let reader = handles.reader.await.unwrap();
        assert_eq!(reader.exit, ReaderExit::EndOfInput);
        assert!(ctx.registry.is_registered(CLIENT));

        for sequence in 1..=2 {
            let _ = ctx.hub.send(tick(sequence));
            let update = timeout(Duration::from_secs(1), outbound.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(update.base, CurrencyCode::Usd.id());
        }
    }

    #[tokio::test]
    async fn closing_outbound_frees_registry_entry() {
        let ctx = context(fixed_rates(2.0));
        let (outbound, handles) =
            open_stream(&ctx, CLIENT, tokio_stream::pending::<Result<RateRequest, Status>>());

        assert!(ctx.registry.is_registered(CLIENT));
        assert_eq!(ctx.active_streams.load(Ordering::Relaxed), 1);

        drop(outbound);

        let sender = timeout(Duration::from_secs(1), handles.sender)
            .await
            .unwrap()
            .unwrap();
        let reader = timeout(Duration::from_secs(1), handles.reader)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(sender.exit, SenderExit::ClientGone);
        assert_eq!(reader.exit, ReaderExit::Cancelled);
        assert!(!ctx.registry.is_registered(CLIENT));
        assert_eq!(ctx.active_streams.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn exhausted_reads_close_the_stream() {
        let ctx = context(fixed_rates(2.0));
        let failing = tokio_stream::iter(
            (0..10).map(|_| Err::<RateRequest, _>(Status::internal("broken"))),
        )
        .chain(tokio_stream::pending());

        let (mut outbound, handles) = open_stream(&ctx, CLIENT, failing);

        let reader = handles.reader.await.unwrap();
        let sender = timeout(Duration::from_secs(1), handles.sender)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reader.exit, ReaderExit::RetriesExhausted);
        assert_eq!(sender.exit, SenderExit::Cancelled);
        assert!(!ctx.registry.is_registered(CLIENT));
        assert!(outbound.next().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_closes_every_stream() {
        let ctx = context(fixed_rates(2.0));
        let (_a, first) =
            open_stream(&ctx, 1, tokio_stream::pending::<Result<RateRequest, Status>>());
        let (_b, second) =
            open_stream(&ctx, 2, tokio_stream::pending::<Result<RateRequest, Status>>());

        ctx.shutdown.cancel();

        for handles in [first, second] {
            let outcome = timeout(Duration::from_secs(1), handles.sender)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(outcome.exit, SenderExit::Cancelled);
        }
        assert_eq!(ctx.registry.client_count(), 0);
    }

    #[tokio::test]
    async fn send_failure_mid_push_ends_stream() {
        let usd_eur = pair(CurrencyCode::Usd, CurrencyCode::Eur);
        let gbp_jpy = pair(CurrencyCode::Gbp, CurrencyCode::Jpy);

        // The client disconnects while the second pair is being quoted
        type ClientSide = Option<ReceiverStream<Result<RateResponse, Status>>>;
        let client_side: Arc<parking_lot::Mutex<ClientSide>> = Arc::default();
        let mut source = MockRateSource::new();
        source.expect_rate().returning({
            let client_side = Arc::clone(&client_side);
            move |quoted| {
                if quoted == gbp_jpy {
                    drop(client_side.lock().take());
                }
                Ok(1.25)
            }
        });
        let ctx = context(RateService::new(Arc::new(source)));

        let (outbound, handles) =
            open_stream(&ctx, CLIENT, tokio_stream::pending::<Result<RateRequest, Status>>());
        *client_side.lock() = Some(outbound);
        ctx.registry.subscribe(CLIENT, usd_eur);
        ctx.registry.subscribe(CLIENT, gbp_jpy);

        let _ = ctx.hub.send(tick(1));
        let _ = ctx.hub.send(tick(2));

        let sender = timeout(Duration::from_secs(1), handles.sender)
            .await
            .unwrap()
            .unwrap();
        let reader = timeout(Duration::from_secs(1), handles.reader)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(sender.exit, SenderExit::SendFailed);
        assert_eq!(sender.ticks, 1);
        assert_eq!(sender.pushes, 1);
        assert_eq!(reader.exit, ReaderExit::Cancelled);
        assert!(!ctx.registry.is_registered(CLIENT));
        assert_eq!(ctx.active_streams.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn datetime_conversion() {
        let dt = Utc::now();
        let ts = datetime_to_timestamp(dt);
        let expected_nanos = i32::try_from(dt.timestamp_subsec_nanos()).unwrap_or(i32::MAX);

        assert_eq!(ts.seconds, dt.timestamp());
        assert_eq!(ts.nanos, expected_nanos);
    }
}
