//! Deadline tracking for a single attempt.
//!
//! A [`TimeoutTracker`] races a guarded operation against a deadline. It is
//! armed at creation and ends in exactly one of two terminal states: fired
//! (the deadline elapsed first — the guarded operation is dropped and the
//! attempt fails with [`AttemptTimeoutError`]) or cancelled (the operation
//! resolved, or the tracker was cancelled explicitly, before the deadline).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project::pin_project;
use thiserror::Error;

/// Error synthesized when an attempt exceeds its configured deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("attempt timed out after {timeout:?}")]
pub struct AttemptTimeoutError {
    timeout: Duration,
}

impl AttemptTimeoutError {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The deadline that was exceeded.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Armed,
    Fired,
    Cancelled,
}

/// Races a guarded future against an optional deadline.
///
/// Without a deadline the tracker stays disarmed and only forwards the
/// guarded future's outcome.
#[derive(Debug)]
#[pin_project]
pub struct TimeoutTracker<F> {
    #[pin]
    guarded: F,
    #[pin]
    deadline: Option<tokio::time::Sleep>,
    timeout: Option<Duration>,
    state: State,
}

impl<F> TimeoutTracker<F> {
    /// Arm a tracker around `guarded` with the given deadline.
    pub fn new(guarded: F, timeout: Option<Duration>) -> Self {
        Self {
            guarded,
            deadline: timeout.map(tokio::time::sleep),
            timeout,
            state: State::Armed,
        }
    }

    /// Cancel the tracker, releasing the timer.
    ///
    /// The guarded future continues to be polled; the deadline can no
    /// longer fire. Cancelling an already-terminal tracker is a no-op.
    pub fn cancel(self: Pin<&mut Self>) {
        let mut this = self.project();
        if *this.state == State::Armed {
            *this.state = State::Cancelled;
            this.deadline.set(None);
        }
    }

    #[cfg(test)]
    fn state(&self) -> State {
        self.state
    }
}

impl<F, T, E> Future for TimeoutTracker<F>
where
    F: Future<Output = Result<T, E>>,
    E: From<AttemptTimeoutError>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        if *this.state == State::Fired {
            panic!("timeout tracker polled after firing");
        }

        match this.guarded.poll(cx) {
            Poll::Ready(output) => {
                if *this.state == State::Armed {
                    *this.state = State::Cancelled;
                    this.deadline.set(None);
                }
                return Poll::Ready(output);
            }
            Poll::Pending => {}
        }

        if *this.state == State::Armed {
            if let (Some(sleep), Some(timeout)) = (this.deadline.as_pin_mut(), *this.timeout) {
                if sleep.poll(cx).is_ready() {
                    *this.state = State::Fired;
                    return Poll::Ready(Err(AttemptTimeoutError::new(timeout).into()));
                }
            }
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use std::future::pending;
    use std::pin::pin;

    use futures_util::future::poll_fn;
    use futures_util::FutureExt;

    #[derive(Debug, PartialEq)]
    struct TestError;

    impl From<AttemptTimeoutError> for TestError {
        fn from(_: AttemptTimeoutError) -> Self {
            TestError
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_deadline() {
        let timeout = Duration::from_secs(5);
        let tracker = TimeoutTracker::new(
            pending::<Result<(), crate::execute::Error>>(),
            Some(timeout),
        );

        let started = tokio::time::Instant::now();
        let error = tracker.await.unwrap_err();

        assert_eq!(started.elapsed(), timeout);
        match error {
            crate::execute::Error::AttemptTimeout(e) => assert_eq!(e.timeout(), timeout),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_tracker_never_fires() {
        let mut tracker = pin!(TimeoutTracker::new(
            pending::<Result<(), TestError>>(),
            Some(Duration::from_secs(1)),
        ));

        tracker.as_mut().cancel();
        tracker.as_mut().cancel();
        assert_eq!(tracker.state(), State::Cancelled);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(poll_fn(|cx| Poll::Ready(tracker.as_mut().poll_unpin(cx).is_pending())).await);
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_cancels_the_timer() {
        let tracker = TimeoutTracker::new(
            std::future::ready(Ok::<_, TestError>(42)),
            Some(Duration::from_secs(1)),
        );

        let mut tracker = pin!(tracker);
        let value = tracker.as_mut().await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn disarmed_without_deadline() {
        let tracker = TimeoutTracker::new(std::future::ready(Ok::<_, TestError>(7)), None);
        assert_eq!(tracker.await, Ok(7));
    }
}
