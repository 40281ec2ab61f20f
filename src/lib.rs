//! Gantry
//!
//! The transport-execution core of an object-storage client: drive a single
//! HTTP attempt to completion under a deadline, and move large objects in
//! bounded-size parts in both directions.
//!
//! There are three pieces:
//!
//! 1. The [`RequestExecutor`] runs one signed request through an injected
//!    [transport][transport::Transport], wiring cancellation, a deadline, and
//!    attempt metrics around the call, and hands back a single cancellable
//!    result handle.
//! 2. The upload [`Splitter`][multipart::Splitter] turns one source byte
//!    stream into an ordered sequence of bounded-size parts and drives each
//!    through a per-part upload capability, with backpressure on both the
//!    source and the capability.
//! 3. The [`Downloader`][multipart::Downloader] retrieves an object's parts
//!    sequentially, discovering the total part count from the first response.
//!
//! Connection management, TLS, signing algorithms, and retry policy all live
//! outside this crate: the transport and signer are injected capabilities,
//! and failures surface exactly once for an outer layer to act on.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod body;
pub use body::Body;
pub mod execute;
pub use execute::RequestExecutor;
mod handle;
pub use handle::{ExecutionHandle, Incomplete};
pub mod multipart;
pub mod rt;
pub mod signer;
pub mod transport;

/// A boxed error, the common currency for failures crossing capability seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
