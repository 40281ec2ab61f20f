//! The download-side part coordinator.
//!
//! A [`Downloader`] pulls an object's parts sequentially: part 1 first,
//! whose response reveals the total part count, then parts 2..=N in order.
//! Fetching one part at a time bounds memory and makes the first-writer-wins
//! total-count discovery race-free by construction.

use std::future::Future;
use std::task::{Context, Poll};

use futures_util::future::poll_fn;
use tower::Service;

use super::{PartRequest, PartResponse, TransferError, TransferState};

/// The per-part read capability.
///
/// Blanket-implemented for any [`tower::Service`] from [`PartRequest`] to
/// [`PartResponse`].
pub trait GetPart {
    /// Error returned when a part fetch fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The future type returned by this capability.
    type Future: Future<Output = Result<PartResponse, Self::Error>> + Send + 'static;

    /// Poll the capability for readiness to accept another request.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>>;

    /// Retrieve one part.
    fn get_part(&mut self, request: PartRequest) -> Self::Future;
}

impl<S> GetPart for S
where
    S: Service<PartRequest, Response = PartResponse>,
    S::Error: std::error::Error + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Service::poll_ready(self, cx)
    }

    fn get_part(&mut self, request: PartRequest) -> Self::Future {
        self.call(request)
    }
}

/// Retrieves an object's parts in order, one at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Downloader {
    _private: (),
}

impl Downloader {
    /// Create a new downloader.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Retrieve every part of `key` through the `store` capability,
    /// resolving with the final part's response.
    ///
    /// The first part's response carries the authoritative total part
    /// count; a store that reports none has handed over the whole object.
    /// The first part error fails the download and no further parts are
    /// requested.
    pub async fn download<S>(
        &self,
        key: impl Into<String>,
        mut store: S,
    ) -> Result<PartResponse, TransferError>
    where
        S: GetPart,
    {
        let key = key.into();
        let mut state = TransferState::new();

        let part = state.start_part();
        let first = fetch(&mut store, &key, part).await?;

        match first.total_parts {
            Some(total) => state.record_total(total),
            None => state.record_total(part),
        }
        state.part_done();

        tracing::debug!(key = %key, total = ?state.total(), "discovered part count");

        let mut last = first;
        while !state.is_complete() {
            let part = state.start_part();
            debug_assert!(state.may_start(part));

            last = fetch(&mut store, &key, part).await?;
            if let Some(total) = last.total_parts {
                // First writer wins; later reports are ignored.
                state.record_total(total);
            }
            state.part_done();
        }

        Ok(last)
    }
}

async fn fetch<S>(store: &mut S, key: &str, part: u32) -> Result<PartResponse, TransferError>
where
    S: GetPart,
{
    poll_fn(|cx| store.poll_ready(cx))
        .await
        .map_err(|error| TransferError::Part {
            part,
            source: error.into(),
        })?;

    tracing::trace!(key = %key, part, "requesting part");

    store
        .get_part(PartRequest {
            key: key.to_owned(),
            part_number: part,
        })
        .await
        .map_err(|error| TransferError::Part {
            part,
            source: error.into(),
        })
}
