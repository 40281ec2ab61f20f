//! The transport seam.
//!
//! A transport owns connection establishment, TLS, and pooling — none of
//! which live in this crate. The executor only requires that dispatching a
//! request yields a future which resolves once the response header block is
//! available, with the body streaming afterwards, and that dropping the
//! future cancels the in-flight call.
//!
//! [`Transport`] is blanket-implemented for any compatible
//! [`tower::Service`], so a transport can be assembled from ordinary
//! service middleware.

pub mod mock;

use std::future::Future;

use tower::Service;

use crate::body::{Request, Response};

/// A transport dispatches one request and delivers the response.
///
/// The returned future resolves when the response headers have been
/// received; the response body streams after that. Cancellation of an
/// in-flight call is expressed by dropping the future.
pub trait Transport: Clone + Send {
    /// Error returned when a dispatch fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The future type returned by this transport.
    type Future: Future<Output = Result<Response, <Self as Transport>::Error>> + Send + 'static;

    /// Dispatch a request over the transport.
    fn dispatch(&mut self, request: Request) -> <Self as Transport>::Future;

    /// Poll the transport to see if it is ready to accept a new request.
    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), <Self as Transport>::Error>>;
}

impl<T> Transport for T
where
    T: Service<Request, Response = Response>,
    T: Clone + Send + Sync + 'static,
    T::Error: std::error::Error + Send + Sync + 'static,
    T::Future: Send + 'static,
{
    type Error = T::Error;
    type Future = T::Future;

    fn dispatch(&mut self, request: Request) -> <Self as Service<Request>>::Future {
        self.call(request)
    }

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), <Self as Transport>::Error>> {
        Service::poll_ready(self, cx)
    }
}
