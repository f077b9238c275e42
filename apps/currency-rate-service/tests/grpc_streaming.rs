//! gRPC Streaming Integration Tests
//!
//! Exercises the full flow from a rate refresh to a gRPC client receiving
//! pushed rates, over a real tonic server bound to a local port.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Server};
use tonic::{Code, Request, Streaming};

use currency_rate_service::{
    CurrencyCode, CurrencyService, CurrencyServiceConfig, ExchangeRates, RateMonitor,
    RateService, RateSource, RateUpdateHub, SubscriptionRegistry, UpdatePublisher,
    proto::{
        RateRequest, RateResponse, currency_client::CurrencyClient,
        currency_server::CurrencyServer,
    },
};

/// Refresh interval used by the test monitor.
const TICK: Duration = Duration::from_millis(100);

/// Upper bound for any single wait in these tests.
const WAIT: Duration = Duration::from_secs(2);

struct TestServer {
    client: CurrencyClient<Channel>,
    shutdown: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    fn stop(self) {
        self.shutdown.cancel();
        self.handle.abort();
    }
}

/// Start a test gRPC server on a random port with a fast, flat rate source.
async fn setup_test_server() -> TestServer {
    let source: Arc<dyn RateSource> =
        Arc::new(ExchangeRates::with_reference_rates(0.0).unwrap());
    let hub = Arc::new(RateUpdateHub::with_defaults());
    let publisher: Arc<dyn UpdatePublisher> = hub.clone();
    let registry = Arc::new(SubscriptionRegistry::new());
    let shutdown = CancellationToken::new();

    RateMonitor::new(Arc::clone(&source), publisher, TICK).spawn(shutdown.clone());

    let service = CurrencyService::new(
        CurrencyServiceConfig::default(),
        RateService::new(source),
        hub,
        registry,
        shutdown.clone(),
    );

    // Find an available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        Server::builder()
            .add_service(CurrencyServer::new(service))
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                server_shutdown.cancelled_owned(),
            )
            .await
            .unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = CurrencyClient::connect(format!("http://{addr}"))
        .await
        .unwrap();

    TestServer {
        client,
        shutdown,
        handle,
    }
}

fn rate_request(base: CurrencyCode, destination: CurrencyCode) -> RateRequest {
    RateRequest {
        base: base.id(),
        destination: destination.id(),
    }
}

/// Open a subscription stream whose request side stays open until `tx` drops.
async fn subscribe(
    client: &mut CurrencyClient<Channel>,
) -> (mpsc::Sender<RateRequest>, Streaming<RateResponse>) {
    let (tx, rx) = mpsc::channel(16);
    let responses = client
        .subscribe_rates(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();
    (tx, responses)
}

async fn next_response(responses: &mut Streaming<RateResponse>) -> RateResponse {
    timeout(WAIT, responses.message())
        .await
        .expect("timed out waiting for a pushed rate")
        .unwrap()
        .expect("stream ended unexpectedly")
}

fn is_pair(response: &RateResponse, base: CurrencyCode, destination: CurrencyCode) -> bool {
    response.base == base.id() && response.destination == destination.id()
}

// =============================================================================
// GetRate Tests
// =============================================================================

#[tokio::test]
async fn test_get_rate_returns_positive_rate() {
    let mut server = setup_test_server().await;

    let response = server
        .client
        .get_rate(Request::new(rate_request(CurrencyCode::Usd, CurrencyCode::Eur)))
        .await
        .unwrap()
        .into_inner();

    assert!(is_pair(&response, CurrencyCode::Usd, CurrencyCode::Eur));
    assert!(response.rate > 0.0);
    assert!(response.updated_at.is_some());

    server.stop();
}

#[tokio::test]
async fn test_get_rate_inverse_pairs_multiply_to_one() {
    let mut server = setup_test_server().await;

    let forward = server
        .client
        .get_rate(Request::new(rate_request(CurrencyCode::Gbp, CurrencyCode::Jpy)))
        .await
        .unwrap()
        .into_inner();
    let inverse = server
        .client
        .get_rate(Request::new(rate_request(CurrencyCode::Jpy, CurrencyCode::Gbp)))
        .await
        .unwrap()
        .into_inner();

    assert!((forward.rate * inverse.rate - 1.0).abs() < 1e-9);

    server.stop();
}

#[tokio::test]
async fn test_get_rate_same_currency_is_invalid_argument() {
    let mut server = setup_test_server().await;

    let status = server
        .client
        .get_rate(Request::new(rate_request(CurrencyCode::Usd, CurrencyCode::Usd)))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);

    server.stop();
}

#[tokio::test]
async fn test_get_rate_unknown_currency_id_is_invalid_argument() {
    let mut server = setup_test_server().await;

    let status = server
        .client
        .get_rate(Request::new(RateRequest {
            base: 99,
            destination: CurrencyCode::Eur.id(),
        }))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(status.message().starts_with("base:"));

    server.stop();
}

#[tokio::test]
async fn test_get_rate_unpublished_currency_is_not_found() {
    let mut server = setup_test_server().await;

    let status = server
        .client
        .get_rate(Request::new(rate_request(CurrencyCode::Rub, CurrencyCode::Eur)))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::NotFound);

    server.stop();
}

// =============================================================================
// SubscribeRates Tests
// =============================================================================

#[tokio::test]
async fn test_subscription_receives_rate_pushes() {
    let mut server = setup_test_server().await;
    let (tx, mut responses) = subscribe(&mut server.client).await;

    tx.send(rate_request(CurrencyCode::Usd, CurrencyCode::Eur))
        .await
        .unwrap();

    // One push per refresh tick
    for _ in 0..3 {
        let response = next_response(&mut responses).await;
        assert!(is_pair(&response, CurrencyCode::Usd, CurrencyCode::Eur));
        assert!(response.rate > 0.0);
        assert!(response.updated_at.is_some());
    }

    server.stop();
}

#[tokio::test]
async fn test_pushed_rate_matches_unary_lookup() {
    let mut server = setup_test_server().await;

    let unary = server
        .client
        .get_rate(Request::new(rate_request(CurrencyCode::Chf, CurrencyCode::Sek)))
        .await
        .unwrap()
        .into_inner();

    let (tx, mut responses) = subscribe(&mut server.client).await;
    tx.send(rate_request(CurrencyCode::Chf, CurrencyCode::Sek))
        .await
        .unwrap();
    let pushed = next_response(&mut responses).await;

    // Flat source: rates never move between ticks
    assert!((pushed.rate - unary.rate).abs() < 1e-12);

    server.stop();
}

#[tokio::test]
async fn test_no_pushes_before_first_subscription() {
    let mut server = setup_test_server().await;
    let (_tx, mut responses) = subscribe(&mut server.client).await;

    // Several ticks pass with nothing subscribed
    let result = timeout(TICK * 3, responses.message()).await;
    assert!(result.is_err(), "Expected no messages without subscriptions");

    server.stop();
}

#[tokio::test]
async fn test_multiple_pairs_on_one_stream() {
    let mut server = setup_test_server().await;
    let (tx, mut responses) = subscribe(&mut server.client).await;

    tx.send(rate_request(CurrencyCode::Usd, CurrencyCode::Eur))
        .await
        .unwrap();
    tx.send(rate_request(CurrencyCode::Gbp, CurrencyCode::Jpy))
        .await
        .unwrap();

    let mut saw_usd_eur = false;
    let mut saw_gbp_jpy = false;
    for _ in 0..6 {
        let response = next_response(&mut responses).await;
        saw_usd_eur |= is_pair(&response, CurrencyCode::Usd, CurrencyCode::Eur);
        saw_gbp_jpy |= is_pair(&response, CurrencyCode::Gbp, CurrencyCode::Jpy);
        if saw_usd_eur && saw_gbp_jpy {
            break;
        }
    }

    assert!(saw_usd_eur && saw_gbp_jpy);

    server.stop();
}

#[tokio::test]
async fn test_pushes_continue_after_request_stream_closes() {
    let mut server = setup_test_server().await;

    // Request side ends immediately after one subscription
    let requests = tokio_stream::iter(vec![rate_request(CurrencyCode::Usd, CurrencyCode::Jpy)]);
    let mut responses = server
        .client
        .subscribe_rates(requests)
        .await
        .unwrap()
        .into_inner();

    for _ in 0..3 {
        let response = next_response(&mut responses).await;
        assert!(is_pair(&response, CurrencyCode::Usd, CurrencyCode::Jpy));
    }

    server.stop();
}

#[tokio::test]
async fn test_invalid_request_does_not_end_stream() {
    let mut server = setup_test_server().await;
    let (tx, mut responses) = subscribe(&mut server.client).await;

    tx.send(rate_request(CurrencyCode::Eur, CurrencyCode::Eur))
        .await
        .unwrap();
    tx.send(RateRequest {
        base: 99,
        destination: CurrencyCode::Usd.id(),
    })
    .await
    .unwrap();
    tx.send(rate_request(CurrencyCode::Eur, CurrencyCode::Usd))
        .await
        .unwrap();

    let response = next_response(&mut responses).await;
    assert!(is_pair(&response, CurrencyCode::Eur, CurrencyCode::Usd));

    server.stop();
}

#[tokio::test]
async fn test_unavailable_pair_is_skipped() {
    let mut server = setup_test_server().await;
    let (tx, mut responses) = subscribe(&mut server.client).await;

    tx.send(rate_request(CurrencyCode::Hrk, CurrencyCode::Eur))
        .await
        .unwrap();
    tx.send(rate_request(CurrencyCode::Aud, CurrencyCode::Nzd))
        .await
        .unwrap();

    for _ in 0..3 {
        let response = next_response(&mut responses).await;
        assert!(is_pair(&response, CurrencyCode::Aud, CurrencyCode::Nzd));
    }

    server.stop();
}
