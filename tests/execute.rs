use std::future::{ready, Ready};
use std::time::Duration;

use http_body_util::BodyExt;
use tokio::sync::mpsc::UnboundedReceiver;

use gantry::body::{Body, Request};
use gantry::execute::{AttemptTimeoutOverride, Error};
use gantry::rt::{Bounded, TokioExecutor};
use gantry::signer::Signer;
use gantry::transport::mock::{MockTransport, TransportEvent};
use gantry::RequestExecutor;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn put_request(body: Body) -> Request {
    http::Request::builder()
        .method(http::Method::PUT)
        .uri("https://store.example/object")
        .body(body)
        .unwrap()
}

async fn dispatched_headers(events: &mut UnboundedReceiver<TransportEvent>) -> http::HeaderMap {
    match events.recv().await.expect("transport should observe a dispatch") {
        TransportEvent::Dispatched { headers, .. } => headers,
        event => panic!("unexpected event: {event:?}"),
    }
}

#[tokio::test]
async fn attaches_content_length_for_known_bodies() {
    let (transport, mut events) = MockTransport::responding();
    let executor = RequestExecutor::new(transport);

    let attempt = executor.execute(async { Ok::<_, BoxError>(put_request(Body::full("hello world!!"))) });
    let response = attempt.await.unwrap();
    assert_eq!(response.status(), http::StatusCode::OK);

    let headers = dispatched_headers(&mut events).await;
    assert_eq!(headers.get(http::header::CONTENT_LENGTH).unwrap(), "13");
}

#[tokio::test]
async fn leaves_get_requests_alone() {
    let (transport, mut events) = MockTransport::responding();
    let executor = RequestExecutor::new(transport);

    let request = http::Request::builder()
        .method(http::Method::GET)
        .uri("https://store.example/object")
        .body(Body::empty())
        .unwrap();

    executor
        .execute(async { Ok::<_, BoxError>(request) })
        .await
        .unwrap();

    let headers = dispatched_headers(&mut events).await;
    assert!(!headers.contains_key(http::header::CONTENT_LENGTH));
}

#[tokio::test]
async fn build_failure_is_forwarded_and_nothing_dispatches() {
    let (transport, mut events) = MockTransport::responding();
    let executor = RequestExecutor::new(transport);

    let error = executor
        .execute(async { Err::<Request, BoxError>("no credentials".into()) })
        .await
        .unwrap_err();

    assert!(matches!(error, Error::Build(_)));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn transport_failure_is_forwarded() {
    let (transport, _events) = MockTransport::erroring();
    let executor = RequestExecutor::new(transport);

    let error = executor
        .execute(async { Ok::<_, BoxError>(put_request(Body::empty())) })
        .await
        .unwrap_err();

    assert!(matches!(error, Error::Transport(_)));
}

#[tokio::test]
async fn cancellation_reaches_the_transport() {
    let (transport, mut events) = MockTransport::hanging();
    let executor = RequestExecutor::new(transport);

    let mut attempt = executor.execute(async { Ok::<_, BoxError>(put_request(Body::empty())) });

    // Wait for the dispatch so the call is in flight before cancelling.
    assert!(matches!(
        events.recv().await.unwrap(),
        TransportEvent::Dispatched { .. }
    ));

    attempt.cancel();
    let error = attempt.await.unwrap_err();
    assert!(matches!(error, Error::Cancelled));

    assert!(matches!(
        events.recv().await.unwrap(),
        TransportEvent::Cancelled
    ));
}

#[tokio::test(start_paused = true)]
async fn deadline_fails_the_attempt_and_cancels_the_call() {
    let (transport, mut events) = MockTransport::hanging();
    let executor = RequestExecutor::builder()
        .with_transport(transport)
        .with_attempt_timeout(Duration::from_secs(5))
        .build();

    let attempt = executor.execute(async { Ok::<_, BoxError>(put_request(Body::empty())) });
    let error = attempt.await.unwrap_err();

    match error {
        Error::AttemptTimeout(e) => assert_eq!(e.timeout(), Duration::from_secs(5)),
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(matches!(
        events.recv().await.unwrap(),
        TransportEvent::Dispatched { .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        TransportEvent::Cancelled
    ));
}

#[tokio::test(start_paused = true)]
async fn request_level_timeout_overrides_the_default() {
    let (transport, _events) = MockTransport::hanging();
    let executor = RequestExecutor::builder()
        .with_transport(transport)
        .with_attempt_timeout(Duration::from_secs(60))
        .build();

    let mut request = put_request(Body::empty());
    request
        .extensions_mut()
        .insert(AttemptTimeoutOverride(Duration::from_secs(1)));

    let started = tokio::time::Instant::now();
    let error = executor
        .execute(async { Ok::<_, BoxError>(request) })
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(60));
    match error {
        Error::AttemptTimeout(e) => assert_eq!(e.timeout(), Duration::from_secs(1)),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn saturated_completion_executor_degrades_to_synchronous() {
    let (transport, _events) = MockTransport::responding();
    let executor = RequestExecutor::builder()
        .with_transport(transport)
        .with_completion_executor(Bounded::new(TokioExecutor::new(), 0))
        .build();

    let response = executor
        .execute(async { Ok::<_, BoxError>(put_request(Body::full("data"))) })
        .await
        .unwrap();

    assert_eq!(response.status(), http::StatusCode::OK);
}

#[tokio::test]
async fn attempt_metrics_record_reads() {
    let (transport, _events) = MockTransport::responding();
    let transport = transport.with_body("sixteen bytes!!!");
    let executor = RequestExecutor::new(transport);

    let request = http::Request::builder()
        .method(http::Method::GET)
        .uri("https://store.example/object")
        .body(Body::empty())
        .unwrap();

    let attempt = executor.execute(async { Ok::<_, BoxError>(request) });
    let metrics = attempt.metrics();
    let response = attempt.await.unwrap();

    assert!(metrics.time_to_first_byte().is_some());
    assert_eq!(metrics.bytes_read(), 0);

    let payload = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(payload.len(), 16);

    assert_eq!(metrics.bytes_read(), 16);
    assert!(metrics.service_call_duration().is_some());
}

#[tokio::test]
async fn signer_is_applied_before_dispatch() {
    #[derive(Debug, Clone)]
    struct HeaderSigner;

    impl Signer for HeaderSigner {
        type Future = Ready<Result<Request, BoxError>>;

        fn sign(&self, mut request: Request) -> Self::Future {
            request
                .headers_mut()
                .insert("x-signature", http::HeaderValue::from_static("sig-v4"));
            ready(Ok(request))
        }
    }

    let (transport, mut events) = MockTransport::responding();
    let executor = RequestExecutor::builder()
        .with_transport(transport)
        .with_signer(HeaderSigner)
        .build();

    executor
        .execute(async { Ok::<_, BoxError>(put_request(Body::full("payload"))) })
        .await
        .unwrap();

    let headers = dispatched_headers(&mut events).await;
    assert_eq!(headers.get("x-signature").unwrap(), "sig-v4");
    // Signing happens before the content-length step sees the request.
    assert_eq!(headers.get(http::header::CONTENT_LENGTH).unwrap(), "7");
}
