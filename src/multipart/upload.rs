//! The upload-side stream splitter.
//!
//! A [`Splitter`] cuts one source byte stream into bounded-size parts and
//! drives each through a per-part upload capability. Parts are materialized
//! lazily: one part's bytes are buffered at a time, and the source is only
//! polled while the part under assembly has room. Admission of a new
//! in-flight part requires both a free slot under the configured limit and
//! readiness from the capability, so backpressure reaches all the way from
//! the store to the source.
//!
//! The aggregate resolves once every part has succeeded, or fails fast on
//! the first part failure — nothing further starts, and dropping the
//! aggregate releases all buffered part memory.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use pin_project::pin_project;
use tower::Service;

use crate::BoxError;

use super::{Part, TransferError, TransferState, UploadedPart};

const DEFAULT_IN_FLIGHT_PARTS: usize = 4;

/// The per-part upload capability.
///
/// Blanket-implemented for any [`tower::Service`] from [`Part`] to
/// [`UploadedPart`], which in practice is a request executor behind a
/// store-specific request shape.
pub trait PutPart {
    /// Error returned when a part upload fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The future type returned by this capability.
    type Future: Future<Output = Result<UploadedPart, Self::Error>> + Send + 'static;

    /// Poll the capability for readiness to accept another part.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>>;

    /// Upload one part.
    fn put_part(&mut self, part: Part) -> Self::Future;
}

impl<S> PutPart for S
where
    S: Service<Part, Response = UploadedPart>,
    S::Error: std::error::Error + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Service::poll_ready(self, cx)
    }

    fn put_part(&mut self, part: Part) -> Self::Future {
        self.call(part)
    }
}

/// Splits a source stream into parts and uploads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Splitter {
    part_size: usize,
    in_flight: usize,
}

impl Splitter {
    /// Create a splitter producing parts of `part_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `part_size` is zero.
    pub fn new(part_size: usize) -> Self {
        assert!(part_size > 0, "part size must be positive");
        Self {
            part_size,
            in_flight: DEFAULT_IN_FLIGHT_PARTS,
        }
    }

    /// Cap the number of concurrently in-flight part uploads.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is zero.
    pub fn with_in_flight_parts(mut self, limit: usize) -> Self {
        assert!(limit > 0, "in-flight limit must be positive");
        self.in_flight = limit;
        self
    }

    /// The configured part size in bytes.
    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// The configured in-flight part limit.
    pub fn in_flight_parts(&self) -> usize {
        self.in_flight
    }

    /// Upload `source` to `key` through the `put` capability.
    ///
    /// The returned future resolves with an [`UploadSummary`] once every
    /// part has succeeded. Dropping it cancels in-flight part uploads and
    /// releases buffered part memory.
    pub fn upload<B, S>(&self, key: impl Into<String>, source: B, put: S) -> Upload<B, S>
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: Into<BoxError>,
        S: PutPart,
    {
        Upload {
            parts: PartStream {
                source,
                part_size: self.part_size,
                buffer: BytesMut::new(),
                done: false,
            },
            put,
            in_flight: FuturesUnordered::new(),
            limit: self.in_flight,
            key: key.into(),
            state: TransferState::new(),
            uploaded: Vec::new(),
            offset: 0,
            source_done: false,
            finished: false,
        }
    }
}

/// Summary of a completed multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    /// The object that was written.
    pub key: String,
    /// Every part's outcome, in index order. A later complete-multipart
    /// call needs these entity tags.
    pub parts: Vec<UploadedPart>,
    /// Total payload bytes uploaded.
    pub total_bytes: u64,
}

/// Lazily cuts a source body into `part_size` chunks.
///
/// Only polls the source while the chunk under assembly has room, so a
/// consumer that stops demanding chunks stops the pull from the source.
#[pin_project]
struct PartStream<B> {
    #[pin]
    source: B,
    part_size: usize,
    buffer: BytesMut,
    done: bool,
}

impl<B> Stream for PartStream<B>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Item = Result<Bytes, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if this.buffer.len() >= *this.part_size {
                return Poll::Ready(Some(Ok(this.buffer.split_to(*this.part_size).freeze())));
            }

            if *this.done {
                if this.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                let len = this.buffer.len();
                return Poll::Ready(Some(Ok(this.buffer.split_to(len).freeze())));
            }

            match std::task::ready!(this.source.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    // Trailer frames carry no payload bytes.
                    if let Ok(data) = frame.into_data() {
                        this.buffer.extend_from_slice(&data);
                    }
                }
                Some(Err(error)) => {
                    *this.done = true;
                    this.buffer.clear();
                    return Poll::Ready(Some(Err(error.into())));
                }
                None => {
                    *this.done = true;
                }
            }
        }
    }
}

/// Tags a part-upload future with its index for failure attribution.
#[pin_project]
struct InFlight<F> {
    part: u32,
    #[pin]
    inner: F,
}

impl<F, E> Future for InFlight<F>
where
    F: Future<Output = Result<UploadedPart, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Output = Result<UploadedPart, TransferError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        this.inner.poll(cx).map(|result| {
            result.map_err(|error| TransferError::Part {
                part: *this.part,
                source: error.into(),
            })
        })
    }
}

/// The aggregate future for one multipart upload.
#[pin_project]
pub struct Upload<B, S: PutPart> {
    #[pin]
    parts: PartStream<B>,
    put: S,
    in_flight: FuturesUnordered<InFlight<S::Future>>,
    limit: usize,
    key: String,
    state: TransferState,
    uploaded: Vec<UploadedPart>,
    offset: u64,
    source_done: bool,
    finished: bool,
}

impl<B, S: PutPart> fmt::Debug for Upload<B, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("state", &self.state)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl<B, S> Future for Upload<B, S>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: Into<BoxError>,
    S: PutPart,
{
    type Output = Result<UploadSummary, TransferError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        if *this.finished {
            panic!("upload polled after completion");
        }

        loop {
            // Drain completions first so slots free up before admission.
            match this.in_flight.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(part))) => {
                    this.state.part_done();
                    tracing::trace!(
                        part = part.part_number,
                        completed = this.state.completed(),
                        "part upload complete"
                    );
                    this.uploaded.push(part);
                    continue;
                }
                Poll::Ready(Some(Err(error))) => {
                    *this.finished = true;
                    // Fail fast: siblings are dropped, nothing further starts.
                    this.in_flight.clear();
                    return Poll::Ready(Err(error));
                }
                Poll::Ready(None) | Poll::Pending => {}
            }

            // Admit the next part once the capability signals readiness and
            // a slot is free under the in-flight limit.
            if !*this.source_done && this.in_flight.len() < *this.limit {
                match this.put.poll_ready(cx) {
                    Poll::Ready(Ok(())) => match this.parts.as_mut().poll_next(cx) {
                        Poll::Ready(Some(Ok(data))) => {
                            let part_number = this.state.start_part();
                            let part =
                                Part::new(this.key.clone(), part_number, *this.offset, data);
                            *this.offset += part.content_length();
                            tracing::trace!(
                                part = part_number,
                                len = part.content_length(),
                                "starting part upload"
                            );
                            this.in_flight.push(InFlight {
                                part: part_number,
                                inner: this.put.put_part(part),
                            });
                            continue;
                        }
                        Poll::Ready(Some(Err(error))) => {
                            *this.finished = true;
                            this.in_flight.clear();
                            return Poll::Ready(Err(TransferError::Source(error)));
                        }
                        Poll::Ready(None) => {
                            *this.source_done = true;
                            this.state.record_total(this.state.parts_started());
                            continue;
                        }
                        Poll::Pending => {}
                    },
                    Poll::Ready(Err(error)) => {
                        *this.finished = true;
                        this.in_flight.clear();
                        return Poll::Ready(Err(TransferError::Part {
                            part: this.state.parts_started() + 1,
                            source: error.into(),
                        }));
                    }
                    Poll::Pending => {}
                }
            }

            if *this.source_done && this.in_flight.is_empty() {
                *this.finished = true;
                let mut parts = std::mem::take(this.uploaded);
                parts.sort_unstable_by_key(|part| part.part_number);
                return Poll::Ready(Ok(UploadSummary {
                    key: std::mem::take(this.key),
                    parts,
                    total_bytes: *this.offset,
                }));
            }

            return Poll::Pending;
        }
    }
}
