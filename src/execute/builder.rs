use std::time::Duration;

use crate::rt::TokioExecutor;
use crate::signer::Unsigned;

use super::RequestExecutor;

/// A builder for [`RequestExecutor`]s.
///
/// The transport is the only required component; the signer defaults to
/// [`Unsigned`], the completion executor to [`TokioExecutor`], and the
/// attempt deadline to none.
#[derive(Debug)]
pub struct Builder<T = (), S = Unsigned, X = TokioExecutor> {
    transport: T,
    signer: S,
    completion: X,
    attempt_timeout: Option<Duration>,
}

impl Builder {
    /// Create a new, empty builder.
    pub fn new() -> Self {
        Self {
            transport: (),
            signer: Unsigned,
            completion: TokioExecutor::new(),
            attempt_timeout: None,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, X> Builder<T, S, X> {
    /// Use the provided transport.
    pub fn with_transport<T2>(self, transport: T2) -> Builder<T2, S, X> {
        Builder {
            transport,
            signer: self.signer,
            completion: self.completion,
            attempt_timeout: self.attempt_timeout,
        }
    }

    /// Use the provided signer.
    pub fn with_signer<S2>(self, signer: S2) -> Builder<T, S2, X> {
        Builder {
            transport: self.transport,
            signer,
            completion: self.completion,
            attempt_timeout: self.attempt_timeout,
        }
    }

    /// Use the provided completion executor.
    pub fn with_completion_executor<X2>(self, completion: X2) -> Builder<T, S, X2> {
        Builder {
            transport: self.transport,
            signer: self.signer,
            completion,
            attempt_timeout: self.attempt_timeout,
        }
    }

    /// Set the default deadline for attempts.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Run attempts without a deadline.
    pub fn without_attempt_timeout(mut self) -> Self {
        self.attempt_timeout = None;
        self
    }

    /// The currently configured attempt deadline.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Build the executor.
    pub fn build(self) -> RequestExecutor<T, S, X> {
        RequestExecutor::from_parts(
            self.transport,
            self.signer,
            self.completion,
            self.attempt_timeout,
        )
    }
}
