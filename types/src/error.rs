//! Error taxonomy for queue operations.

use thiserror::Error;

/// Returned by `add` once `stop` has sealed the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue has been stopped; no new tasks are accepted")]
pub struct QueueTerminated;

/// Failure observed while awaiting a task or a checkpoint.
///
/// `Failed` carries the operation's own error unchanged. `Abandoned` means the
/// queue was dropped while the awaited value could still never be produced,
/// e.g. a task added to a queue that was never started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError<E> {
    #[error("task failed: {0}")]
    Failed(E),
    #[error("queue dropped before the result was settled")]
    Abandoned,
}

impl<E> TaskError<E> {
    /// The operation's error, if this is a task failure.
    #[must_use]
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failed(reason) => Some(reason),
            Self::Abandoned => None,
        }
    }

    #[must_use]
    pub const fn is_abandoned(&self) -> bool {
        matches!(self, Self::Abandoned)
    }
}
