//! Completion handles linking a caller-visible result to an internal driver.
//!
//! [`channel`] produces a linked pair: the [`Completer`] lives with the
//! internal operation and resolves the outcome, the [`ExecutionHandle`] is
//! handed to the caller. The link is bidirectional: completing the operation
//! resolves the handle, and cancelling (or dropping) the handle is observable
//! from the completer side. Both directions are idempotent — a handle
//! resolves at most once, and signals arriving after resolution are no-ops.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::{oneshot, watch};

/// Error returned when the internal operation was dropped without resolving
/// its handle.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("operation dropped without resolving its handle")]
pub struct Incomplete;

/// Create a linked completer/handle pair.
pub(crate) fn channel<T>() -> (Completer<T>, ExecutionHandle<T>) {
    let (tx, rx) = oneshot::channel();

    // The cancellation leg is an inverted watch pair: the handle holds the
    // receiver, and dropping it is the signal the completer waits on.
    let (closed, cancel) = watch::channel(());

    (
        Completer {
            tx: Some(tx),
            closed,
        },
        ExecutionHandle {
            rx,
            cancel: Some(cancel),
        },
    )
}

/// The caller-visible completion object for an asynchronous operation.
///
/// Resolves exactly once with the value the internal operation produced.
/// Calling [`cancel`][ExecutionHandle::cancel], or dropping the handle,
/// signals cancellation to the operation.
#[derive(Debug)]
pub struct ExecutionHandle<T> {
    rx: oneshot::Receiver<T>,
    cancel: Option<watch::Receiver<()>>,
}

impl<T> ExecutionHandle<T> {
    /// Request cancellation of the linked operation.
    ///
    /// Idempotent: cancelling twice, or after the operation resolved, has no
    /// further effect. The handle can still be awaited afterwards to observe
    /// the terminal outcome.
    pub fn cancel(&mut self) {
        let _ = self.cancel.take();
        tracing::trace!("requesting cancellation");
    }
}

impl<T> Future for ExecutionHandle<T> {
    type Output = Result<T, Incomplete>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map_err(|_| Incomplete)
    }
}

/// The internal half of a completion pair.
///
/// Owned by the driver of the operation. The first call to
/// [`complete`][Completer::complete] wins; later calls are no-ops.
#[derive(Debug)]
pub(crate) struct Completer<T> {
    tx: Option<oneshot::Sender<T>>,
    closed: watch::Sender<()>,
}

impl<T> Completer<T> {
    /// Record the terminal outcome.
    ///
    /// Returns `true` if this call resolved the handle, `false` if the
    /// outcome was already recorded or the handle is gone.
    pub(crate) fn complete(&mut self, value: T) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Resolves when the linked handle is cancelled or dropped.
    pub(crate) async fn cancelled(&self) {
        self.closed.closed().await;
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(ExecutionHandle<()>: Send, Future);
    assert_impl_all!(Incomplete: std::error::Error, Send, Sync);

    #[tokio::test]
    async fn completes_once() {
        let (mut completer, handle) = channel();

        assert!(completer.complete(1));
        assert!(!completer.complete(2));

        assert_eq!(handle.await, Ok(1));
    }

    #[tokio::test]
    async fn cancel_reaches_completer() {
        let (completer, mut handle) = channel::<()>();

        handle.cancel();
        completer.cancelled().await;
    }

    #[tokio::test]
    async fn drop_reaches_completer() {
        let (completer, handle) = channel::<()>();

        drop(handle);
        completer.cancelled().await;
    }

    #[tokio::test]
    async fn dropped_completer_yields_incomplete() {
        let (completer, handle) = channel::<()>();

        drop(completer);
        assert_eq!(handle.await, Err(Incomplete));
    }

    #[tokio::test]
    async fn completion_after_cancel_is_delivered() {
        let (mut completer, mut handle) = channel();

        handle.cancel();
        assert!(completer.complete(5));
        assert_eq!(handle.await, Ok(5));
    }
}
