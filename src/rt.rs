//! Executors for background work and completion hand-off.
//!
//! Attempt results are handed to a [`CompletionExecutor`] so the driver of a
//! transport call never blocks on downstream callbacks. Executors may be
//! saturable: [`offload`][CompletionExecutor::offload] can reject the task,
//! returning it to the caller so the completion can run synchronously
//! instead — delivery of a result never depends on the hand-off succeeding.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::rt::Executor;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// A tokio executor for running futures on the multi-threaded runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioExecutor;

impl TokioExecutor {
    /// Create a new tokio executor.
    pub fn new() -> Self {
        Self
    }
}

impl<F> Executor<F> for TokioExecutor
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, future: F) {
        tokio::spawn(future);
    }
}

/// A tokio executor for running futures on the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCurrentThreadExecutor;

impl TokioCurrentThreadExecutor {
    /// Create a new current-thread executor.
    pub fn new() -> Self {
        Self
    }
}

impl<F> Executor<F> for TokioCurrentThreadExecutor
where
    F: Future + 'static,
    F::Output: 'static,
{
    fn execute(&self, future: F) {
        tokio::task::spawn_local(future);
    }
}

/// One unit of completion work, runnable as a future or inline.
pub struct CompletionTask {
    work: Option<Box<dyn FnOnce() + Send>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl CompletionTask {
    pub(crate) fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            work: Some(Box::new(work)),
            permit: None,
        }
    }

    /// Run the completion work on the calling thread.
    pub fn run(mut self) {
        if let Some(work) = self.work.take() {
            work();
        }
    }
}

impl Future for CompletionTask {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(work) = self.work.take() {
            work();
        }
        self.permit.take();
        Poll::Ready(())
    }
}

impl fmt::Debug for CompletionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionTask")
            .field("pending", &self.work.is_some())
            .finish()
    }
}

/// Error returned when a completion executor refuses a task.
///
/// Carries the task back to the caller so it can run synchronously.
pub struct Rejected {
    task: CompletionTask,
}

impl Rejected {
    /// Recover the rejected task.
    pub fn into_task(self) -> CompletionTask {
        self.task
    }
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").finish()
    }
}

/// An executor for completing result handles off the I/O path.
pub trait CompletionExecutor {
    /// Hand a completion task to the executor.
    ///
    /// A saturated executor returns the task in [`Rejected`] rather than
    /// queueing unboundedly or dropping it.
    fn offload(&self, task: CompletionTask) -> Result<(), Rejected>;
}

impl CompletionExecutor for TokioExecutor {
    fn offload(&self, task: CompletionTask) -> Result<(), Rejected> {
        self.execute(task);
        Ok(())
    }
}

/// Caps the number of in-flight completion tasks on an inner executor.
///
/// When all permits are taken, [`offload`][CompletionExecutor::offload]
/// rejects, handing the task back for synchronous completion.
#[derive(Debug, Clone)]
pub struct Bounded<E> {
    inner: E,
    permits: Arc<Semaphore>,
}

impl<E> Bounded<E> {
    /// Bound `inner` to at most `limit` in-flight completion tasks.
    pub fn new(inner: E, limit: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(limit)),
        }
    }
}

impl<E> CompletionExecutor for Bounded<E>
where
    E: Executor<CompletionTask>,
{
    fn offload(&self, mut task: CompletionTask) -> Result<(), Rejected> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                task.permit = Some(permit);
                self.inner.execute(task);
                Ok(())
            }
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                Err(Rejected { task })
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};

    use static_assertions::assert_impl_all;

    assert_impl_all!(TokioExecutor: CompletionExecutor, Send, Sync);
    assert_impl_all!(Bounded<TokioExecutor>: CompletionExecutor, Send, Sync);
    assert_impl_all!(CompletionTask: Future, Send);

    #[test]
    fn rejected_task_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task = CompletionTask::new(move || flag.store(true, Ordering::SeqCst));

        task.run();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn bounded_rejects_when_saturated() {
        let executor = Bounded::new(TokioExecutor::new(), 0);
        let task = CompletionTask::new(|| {});

        let rejected = executor.offload(task).unwrap_err();
        rejected.into_task().run();
    }

    #[tokio::test]
    async fn bounded_accepts_within_limit() {
        let executor = Bounded::new(TokioExecutor::new(), 1);
        let (tx, rx) = tokio::sync::oneshot::channel();

        executor
            .offload(CompletionTask::new(move || {
                let _ = tx.send(());
            }))
            .unwrap();

        rx.await.unwrap();
    }
}
