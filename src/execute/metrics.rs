//! Attempt-scoped metrics.
//!
//! Every attempt owns an [`AttemptMetrics`] sink. The executor records the
//! time to the first header block when the transport resolves; the response
//! body is wrapped in a [`MeteredBody`] which accumulates bytes read and
//! stamps the total service-call duration when the stream ends. The sink is
//! written concurrently from the driver task and whoever consumes the body,
//! so counters are atomic and durations are set-once cells.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Buf;
use pin_project::pin_project;
use tokio::time::Instant;

/// The metrics recorded for one attempt.
#[derive(Debug, Default)]
pub struct AttemptMetrics {
    bytes_read: AtomicU64,
    time_to_first_byte: OnceLock<Duration>,
    service_call_duration: OnceLock<Duration>,
}

impl AttemptMetrics {
    /// Total response-body bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Elapsed time from dispatch to the first header block, once recorded.
    pub fn time_to_first_byte(&self) -> Option<Duration> {
        self.time_to_first_byte.get().copied()
    }

    /// Elapsed time from dispatch to the end of the response body, once
    /// recorded.
    pub fn service_call_duration(&self) -> Option<Duration> {
        self.service_call_duration.get().copied()
    }

    pub(crate) fn add_bytes_read(&self, count: u64) {
        self.bytes_read.fetch_add(count, Ordering::Relaxed);
    }

    // Set-once: later recordings are no-ops.
    pub(crate) fn record_time_to_first_byte(&self, elapsed: Duration) {
        let _ = self.time_to_first_byte.set(elapsed);
    }

    pub(crate) fn record_service_call_duration(&self, elapsed: Duration) {
        let _ = self.service_call_duration.set(elapsed);
    }
}

/// Counts the bytes flowing out of a response body into the attempt's
/// metrics sink, and records the service-call duration at end-of-stream.
#[derive(Debug)]
#[pin_project]
pub struct MeteredBody<B> {
    #[pin]
    inner: B,
    metrics: Arc<AttemptMetrics>,
    started: Instant,
}

impl<B> MeteredBody<B> {
    pub(crate) fn new(inner: B, metrics: Arc<AttemptMetrics>, started: Instant) -> Self {
        Self {
            inner,
            metrics,
            started,
        }
    }
}

impl<B> http_body::Body for MeteredBody<B>
where
    B: http_body::Body,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let result = std::task::ready!(this.inner.poll_frame(cx));

        match &result {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.metrics.add_bytes_read(data.remaining() as u64);
                }
            }
            Some(Err(_)) => {}
            None => {
                this.metrics
                    .record_service_call_duration(this.started.elapsed());
            }
        }

        std::task::Poll::Ready(result)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}
