//! The multipart transfer engine.
//!
//! Large objects move in bounded-size, 1-indexed parts. The upload side
//! ([`Splitter`]) cuts one source byte stream into parts and drives each
//! through a per-part upload capability under backpressure; the download
//! side ([`Downloader`]) retrieves parts sequentially, discovering the
//! total part count from the first response. Both share the invariants
//! tracked by [`TransferState`]: indices increase strictly and are never
//! reused, the discovered total is immutable, and the first part failure
//! terminates the whole transfer.

pub mod download;
pub mod upload;

pub use download::{Downloader, GetPart};
pub use upload::{PutPart, Splitter, Upload, UploadSummary};

use bytes::Bytes;
use thiserror::Error;

use crate::{Body, BoxError};

/// Error terminating a multipart transfer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransferError {
    /// Reading the source byte stream failed.
    #[error("source: {0}")]
    Source(#[source] BoxError),

    /// A part operation failed. The transfer stops at the first such
    /// failure; sibling parts are not retried here.
    #[error("part {part}: {source}")]
    Part {
        /// The index of the failed part.
        part: u32,
        /// The underlying store or transport error.
        #[source]
        source: BoxError,
    },
}

/// One indexed, bounded-size segment of an object being uploaded.
#[derive(Debug, Clone)]
pub struct Part {
    key: String,
    part_number: u32,
    offset: u64,
    data: Bytes,
}

impl Part {
    pub(crate) fn new(key: String, part_number: u32, offset: u64, data: Bytes) -> Self {
        Self {
            key,
            part_number,
            offset,
            data,
        }
    }

    /// The object this part belongs to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The 1-based part index.
    pub fn part_number(&self) -> u32 {
        self.part_number
    }

    /// The number of payload bytes in this part.
    pub fn content_length(&self) -> u64 {
        self.data.len() as u64
    }

    /// The part's byte range within the whole object.
    pub fn range(&self) -> ByteRange {
        ByteRange {
            first: self.offset,
            last: self.offset + self.content_length().saturating_sub(1),
        }
    }

    /// The part payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consume the part, returning its payload.
    pub fn into_data(self) -> Bytes {
        self.data
    }
}

/// Outcome of one successful part upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    /// The 1-based part index.
    pub part_number: u32,
    /// The store's entity tag for the part, when reported.
    pub etag: Option<String>,
}

/// A request for one part of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRequest {
    /// The object to read from.
    pub key: String,
    /// The 1-based part index to retrieve.
    pub part_number: u32,
}

/// An inclusive byte range within an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Offset of the first byte.
    pub first: u64,
    /// Offset of the last byte.
    pub last: u64,
}

impl ByteRange {
    /// The number of bytes covered by this range.
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    /// Whether the range covers no bytes. Always false for well-formed
    /// ranges; present for API completeness.
    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bytes {}-{}", self.first, self.last)
    }
}

/// One part's response from the store.
#[derive(Debug)]
pub struct PartResponse {
    /// The total number of parts in the object, when the server reports it.
    /// Authoritative on the first response that carries it.
    pub total_parts: Option<u32>,
    /// The byte range this part covers, when the server reports it.
    pub range: Option<ByteRange>,
    /// The part's body stream.
    pub body: Body,
}

/// Aggregate state over one multipart operation.
///
/// Centralizes the transfer invariants: part indices are assigned
/// monotonically starting at 1 and never reused; the total part count is
/// written once by the first authoritative response and never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferState {
    total: Option<u32>,
    next: u32,
    completed: u32,
}

impl TransferState {
    /// A fresh transfer: no parts assigned, total unknown.
    pub fn new() -> Self {
        Self {
            total: None,
            next: 1,
            completed: 0,
        }
    }

    /// Assign the next part index.
    pub fn start_part(&mut self) -> u32 {
        let part = self.next;
        self.next += 1;
        part
    }

    /// Record the authoritative total part count. First writer wins: once
    /// the total is known, later reports are ignored.
    pub fn record_total(&mut self, total: u32) {
        if self.total.is_none() {
            self.total = Some(total);
        }
    }

    /// The discovered total part count, if known.
    pub fn total(&self) -> Option<u32> {
        self.total
    }

    /// Record one part reaching its terminal success.
    pub fn part_done(&mut self) {
        self.completed += 1;
    }

    /// How many parts have completed.
    pub fn completed(&self) -> u32 {
        self.completed
    }

    /// How many part indices have been assigned.
    pub fn parts_started(&self) -> u32 {
        self.next - 1
    }

    /// Whether a known total has been fully completed.
    pub fn is_complete(&self) -> bool {
        matches!(self.total, Some(total) if self.completed >= total)
    }

    /// Whether `part` may be requested without exceeding a known total.
    pub fn may_start(&self, part: u32) -> bool {
        self.total.map_or(true, |total| part <= total)
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(TransferError: std::error::Error, Send, Sync);
    assert_impl_all!(Part: Send, Sync, Clone);
    assert_impl_all!(PartResponse: Send, Sync);

    #[test]
    fn indices_are_monotonic() {
        let mut state = TransferState::new();
        assert_eq!(state.start_part(), 1);
        assert_eq!(state.start_part(), 2);
        assert_eq!(state.start_part(), 3);
        assert_eq!(state.parts_started(), 3);
    }

    #[test]
    fn first_total_wins() {
        let mut state = TransferState::new();
        state.record_total(4);
        state.record_total(9);
        assert_eq!(state.total(), Some(4));
    }

    #[test]
    fn completion_requires_known_total() {
        let mut state = TransferState::new();
        state.part_done();
        assert!(!state.is_complete());

        state.record_total(1);
        assert!(state.is_complete());
    }

    #[test]
    fn may_start_respects_total() {
        let mut state = TransferState::new();
        assert!(state.may_start(17));

        state.record_total(3);
        assert!(state.may_start(3));
        assert!(!state.may_start(4));
    }

    #[test]
    fn part_reports_its_range() {
        let part = Part::new("key".into(), 2, 8, Bytes::from_static(b"abcd"));
        assert_eq!(part.range(), ByteRange { first: 8, last: 11 });
        assert_eq!(part.range().len(), 4);
        assert_eq!(part.range().to_string(), "bytes 8-11");
    }
}
