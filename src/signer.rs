//! The request-signing seam.
//!
//! Signing is an external capability: this crate applies a [`Signer`] to a
//! built request immediately before dispatch and otherwise treats it as
//! opaque. The algorithm itself lives with the credential layers outside
//! this core.

use std::future::{ready, Future, Ready};

use crate::body::Request;
use crate::BoxError;

/// Signs a request before it is dispatched over the transport.
pub trait Signer {
    /// The future returned by [`sign`][Signer::sign].
    type Future: Future<Output = Result<Request, BoxError>> + Send + 'static;

    /// Produce the signed form of `request`.
    fn sign(&self, request: Request) -> Self::Future;
}

/// Passes requests through unsigned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Unsigned;

impl Signer for Unsigned {
    type Future = Ready<Result<Request, BoxError>>;

    fn sign(&self, request: Request) -> Self::Future {
        ready(Ok(request))
    }
}
