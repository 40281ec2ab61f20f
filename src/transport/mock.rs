//! A scriptable transport, suitable for testing behavior of
//! transport-dependent code without a network.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::body::{Body, Request, Response};

/// An error that can occur when dispatching through a mock transport.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("mock transport error")]
pub struct MockTransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportMode {
    Respond,
    Error,
    Hang,
}

/// What a [`MockTransport`] observed, delivered on the paired receiver.
#[derive(Debug)]
pub enum TransportEvent {
    /// A request was dispatched. Carries what the transport saw.
    Dispatched {
        /// The request method.
        method: Method,
        /// The request target.
        uri: Uri,
        /// The request headers as dispatched.
        headers: HeaderMap,
    },
    /// An in-flight call was dropped before it completed.
    Cancelled,
}

/// A mock transport that can be used to test dispatch behavior.
///
/// Each constructor returns the transport together with a receiver of
/// [`TransportEvent`]s, so tests can assert on what was dispatched and
/// observe cancellation of in-flight calls.
#[derive(Debug, Clone)]
pub struct MockTransport {
    mode: TransportMode,
    respond_with: Bytes,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MockTransport {
    fn new(mode: TransportMode) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                mode,
                respond_with: Bytes::new(),
                events,
            },
            rx,
        )
    }

    /// Transport which answers every dispatch with a `200` response.
    pub fn responding() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        Self::new(TransportMode::Respond)
    }

    /// Transport which fails every dispatch.
    pub fn erroring() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        Self::new(TransportMode::Error)
    }

    /// Transport whose dispatches never resolve, for exercising deadlines
    /// and cancellation.
    pub fn hanging() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        Self::new(TransportMode::Hang)
    }

    /// Use `data` as the response body for successful dispatches.
    pub fn with_body(mut self, data: impl Into<Bytes>) -> Self {
        self.respond_with = data.into();
        self
    }
}

impl tower::Service<Request> for MockTransport {
    type Response = Response;
    type Error = MockTransportError;
    type Future = MockFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let _ = self.events.send(TransportEvent::Dispatched {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
        });

        match self.mode {
            TransportMode::Respond => MockFuture::ready(Ok(http::Response::builder()
                .status(http::StatusCode::OK)
                .body(Body::full(self.respond_with.clone()))
                .expect("static response parts are valid"))),
            TransportMode::Error => MockFuture::ready(Err(MockTransportError)),
            TransportMode::Hang => MockFuture::hang(self.events.clone()),
        }
    }
}

/// The future returned by [`MockTransport`] dispatches.
pub struct MockFuture {
    outcome: Option<Result<Response, MockTransportError>>,
    pending: Option<PendingGuard>,
}

impl MockFuture {
    fn ready(outcome: Result<Response, MockTransportError>) -> Self {
        Self {
            outcome: Some(outcome),
            pending: None,
        }
    }

    fn hang(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            outcome: None,
            pending: Some(PendingGuard { events }),
        }
    }
}

impl Future for MockFuture {
    type Output = Result<Response, MockTransportError>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl fmt::Debug for MockFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockFuture")
            .field("hanging", &self.pending.is_some())
            .finish()
    }
}

/// Reports the drop of a never-resolving call as a cancellation.
struct PendingGuard {
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let _ = self.events.send(TransportEvent::Cancelled);
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::transport::Transport;

    use static_assertions::assert_impl_all;

    assert_impl_all!(MockTransportError: std::error::Error, Send, Sync);
    assert_impl_all!(MockTransport: Transport);

    #[tokio::test]
    async fn responds_with_scripted_body() {
        use http_body_util::BodyExt;
        use tower::Service;

        let (transport, mut events) = MockTransport::responding();
        let mut transport = transport.with_body("part-data");

        let request = http::Request::builder()
            .method(Method::GET)
            .uri("mock://store/object")
            .body(Body::empty())
            .unwrap();

        let response = transport.call(request).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let collected = response.into_body().collect().await.unwrap();
        assert_eq!(collected.to_bytes(), Bytes::from("part-data"));

        match events.recv().await.unwrap() {
            TransportEvent::Dispatched { method, .. } => assert_eq!(method, Method::GET),
            event => panic!("unexpected event: {event:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_hanging_call_reports_cancellation() {
        use tower::Service;

        let (mut transport, mut events) = MockTransport::hanging();

        let request = http::Request::builder()
            .uri("mock://store/object")
            .body(Body::empty())
            .unwrap();

        let call = transport.call(request);
        drop(call);

        assert!(matches!(
            events.recv().await.unwrap(),
            TransportEvent::Dispatched { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            TransportEvent::Cancelled
        ));
    }
}
