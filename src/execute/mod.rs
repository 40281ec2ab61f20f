//! The request-execution stage.
//!
//! A [`RequestExecutor`] drives one signed request through an injected
//! [transport][crate::transport::Transport]. It finishes building the
//! request (signing, content-length), races the dispatch against the
//! resolved attempt deadline, records attempt metrics, and hands the caller
//! an [`Attempt`]: a single cancellable result handle.
//!
//! Cancellation is bidirectional. Failing to build the request fails the
//! attempt; cancelling the attempt cancels the pending build and the
//! in-flight transport call. Either signal after the attempt has resolved
//! is a no-op.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::body::{Request, Response};
use crate::handle::{self, ExecutionHandle};
use crate::rt::{CompletionExecutor, CompletionTask, TokioExecutor};
use crate::signer::{Signer, Unsigned};
use crate::transport::Transport;
use crate::{Body, BoxError};

mod builder;
pub mod metrics;
pub mod timeout;

pub use builder::Builder;
pub use metrics::{AttemptMetrics, MeteredBody};
pub use timeout::{AttemptTimeoutError, TimeoutTracker};

/// Attempt error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller-supplied request future failed before dispatch.
    #[error("build: {0}")]
    Build(#[source] BoxError),

    /// The signer refused the request.
    #[error("sign: {0}")]
    Sign(#[source] BoxError),

    /// The transport failed the in-flight call.
    #[error("transport: {0}")]
    Transport(#[source] BoxError),

    /// The attempt deadline elapsed before the transport resolved.
    #[error(transparent)]
    AttemptTimeout(#[from] AttemptTimeoutError),

    /// The attempt was cancelled through its handle.
    #[error("attempt cancelled")]
    Cancelled,
}

/// Request-level override for the attempt deadline.
///
/// Insert into the request's [extensions][http::Extensions] to replace the
/// executor's configured default for that request only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimeoutOverride(pub Duration);

/// Executes single request attempts over a transport.
///
/// The executor is cheap to clone and shares no per-attempt state; every
/// call to [`execute`][RequestExecutor::execute] produces an independent
/// [`Attempt`].
#[derive(Clone)]
pub struct RequestExecutor<T, S = Unsigned, X = TokioExecutor> {
    transport: T,
    signer: S,
    completion: X,
    attempt_timeout: Option<Duration>,
}

impl<T, S, X> fmt::Debug for RequestExecutor<T, S, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl<T> RequestExecutor<T> {
    /// Create an executor over `transport` with no deadline, no signer, and
    /// the default tokio completion executor.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            signer: Unsigned,
            completion: TokioExecutor::new(),
            attempt_timeout: None,
        }
    }
}

impl RequestExecutor<()> {
    /// Create a new, empty builder for executors.
    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<T, S, X> RequestExecutor<T, S, X> {
    pub(crate) fn from_parts(
        transport: T,
        signer: S,
        completion: X,
        attempt_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            signer,
            completion,
            attempt_timeout,
        }
    }

    /// The configured default attempt deadline.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }
}

impl<T, S, X> RequestExecutor<T, S, X>
where
    T: Transport + 'static,
    S: Signer + Clone + Send + Sync + 'static,
    X: CompletionExecutor + Clone + Send + 'static,
{
    /// Run one attempt: await the request future, sign and finalize the
    /// request, dispatch it, and resolve the returned [`Attempt`] with the
    /// terminal outcome.
    pub fn execute<F>(&self, request: F) -> Attempt
    where
        F: Future<Output = Result<Request, BoxError>> + Send + 'static,
    {
        let (mut completer, handle) = handle::channel();
        let metrics = Arc::new(AttemptMetrics::default());
        let started = Instant::now();

        let mut transport = self.transport.clone();
        let signer = self.signer.clone();
        let completion = self.completion.clone();
        let default_timeout = self.attempt_timeout;
        let sink = metrics.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = completer.cancelled() => Err(Error::Cancelled),
                outcome = async {
                    let request = request.await.map_err(Error::Build)?;
                    let request = signer.sign(request).await.map_err(Error::Sign)?;
                    let mut request = set_content_length(request);

                    let timeout = request
                        .extensions_mut()
                        .remove::<AttemptTimeoutOverride>()
                        .map(|o| o.0)
                        .or(default_timeout);

                    tracing::trace!(uri = %request.uri(), method = %request.method(), ?timeout, "dispatching request");

                    let dispatch = async {
                        futures_util::future::poll_fn(|cx| transport.poll_ready(cx))
                            .await
                            .map_err(|error| Error::Transport(error.into()))?;

                        let response = transport
                            .dispatch(request)
                            .await
                            .map_err(|error| Error::Transport(error.into()))?;

                        sink.record_time_to_first_byte(started.elapsed());

                        Ok(response
                            .map(|body| Body::new(MeteredBody::new(body, sink.clone(), started))))
                    };

                    TimeoutTracker::new(dispatch, timeout).await
                } => outcome,
            };

            let task = CompletionTask::new(move || {
                let _ = completer.complete(outcome);
            });

            if let Err(rejected) = completion.offload(task) {
                tracing::warn!(
                    "could not offload attempt completion to the configured executor; \
                     completing synchronously on the driver task"
                );
                rejected.into_task().run();
            }
        });

        Attempt {
            handle,
            metrics,
            started,
        }
    }
}

/// One execution try: the caller-visible handle over a dispatched attempt.
///
/// Resolves exactly once with the attempt's terminal outcome. Dropping the
/// attempt, or calling [`cancel`][Attempt::cancel], cancels the pending
/// build and the in-flight transport call.
#[derive(Debug)]
pub struct Attempt {
    handle: ExecutionHandle<Result<Response, Error>>,
    metrics: Arc<AttemptMetrics>,
    started: Instant,
}

impl Attempt {
    /// Request cancellation of this attempt.
    ///
    /// The attempt can still be awaited to observe the terminal outcome.
    pub fn cancel(&mut self) {
        self.handle.cancel();
    }

    /// The metrics sink for this attempt.
    pub fn metrics(&self) -> Arc<AttemptMetrics> {
        self.metrics.clone()
    }

    /// When this attempt started.
    pub fn started(&self) -> Instant {
        self.started
    }
}

impl Future for Attempt {
    type Output = Result<Response, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|outcome| match outcome {
            Ok(outcome) => outcome,
            Err(_incomplete) => Err(Error::Cancelled),
        })
    }
}

/// Attach a `content-length` header when the body length is known.
///
/// Body-less methods and requests with an explicit header are left as-is,
/// as are unknown-length (chunked) bodies.
fn set_content_length(mut request: Request) -> Request {
    use http_body::Body as _;

    if request.method() == http::Method::GET
        || request.method() == http::Method::HEAD
        || request.headers().contains_key(http::header::CONTENT_LENGTH)
    {
        return request;
    }

    if let Some(length) = request.body().size_hint().exact() {
        request
            .headers_mut()
            .insert(http::header::CONTENT_LENGTH, http::HeaderValue::from(length));
    }

    request
}
