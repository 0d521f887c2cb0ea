//! Enrolled tasks and the per-task handle returned by `add`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pace_types::TaskError;
use tokio::sync::oneshot;

/// A boxed, not-yet-invoked operation.
pub(crate) type Operation<T, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send>;

pub(crate) fn boxed_operation<F, Fut, T, E>(operation: F) -> Operation<T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Box::new(move || operation().boxed())
}

/// One unit of work owned by the queue until it is admitted.
pub(crate) struct Task<T, E> {
    pub(crate) index: usize,
    pub(crate) operation: Operation<T, E>,
    /// Present only for tasks enrolled through `add`.
    pub(crate) owner: Option<oneshot::Sender<Result<T, E>>>,
}

/// Awaits the outcome of a single task enrolled with `add`.
///
/// Independent of the queue's checkpoints: dropping the handle does not
/// affect the task or any checkpoint that covers it.
#[derive(Debug)]
#[must_use = "the handle is the only way to observe this task's own outcome"]
pub struct TaskHandle<T, E> {
    index: usize,
    outcome: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> TaskHandle<T, E> {
    pub(crate) fn new(index: usize, outcome: oneshot::Receiver<Result<T, E>>) -> Self {
        Self { index, outcome }
    }

    /// Enrollment index of the task; also its slot in checkpoint results.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome)
            .poll(cx)
            .map(|received| match received {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(reason)) => Err(TaskError::Failed(reason)),
                // Sender dropped without sending: the task never ran.
                Err(_) => Err(TaskError::Abandoned),
            })
    }
}
