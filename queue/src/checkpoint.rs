//! Start/stop checkpoints over the queue's task set.
//!
//! A checkpoint snapshots how many tasks were enrolled when it was requested
//! and settles once, either with every covered result in index order or with
//! the first covered failure. The queue holds one [`CheckpointSlot`] per
//! checkpoint kind; callers hold [`Checkpoint`] handles that observe it.

use std::fmt;
use std::future::IntoFuture;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pace_types::TaskError;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckpointKind {
    Start,
    Stop,
}

impl CheckpointKind {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value published to checkpoint observers.
#[derive(Debug, Clone)]
pub(crate) enum CheckpointStatus<T, E> {
    Pending,
    Resolved(Vec<T>),
    Rejected(E),
}

impl<T, E> CheckpointStatus<T, E> {
    fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

pub(crate) struct PendingCheckpoint<T, E> {
    captured_len: usize,
    resolved: usize,
    status: watch::Sender<CheckpointStatus<T, E>>,
}

/// Queue-side state of one checkpoint.
///
/// Settlement moves the sender into `Settled`; nothing moves it back, which
/// is what keeps a checkpoint from settling twice.
pub(crate) enum CheckpointSlot<T, E> {
    NotRequested,
    Pending(PendingCheckpoint<T, E>),
    Settled(watch::Sender<CheckpointStatus<T, E>>),
}

impl<T, E> CheckpointSlot<T, E> {
    pub(crate) const fn is_requested(&self) -> bool {
        !matches!(self, Self::NotRequested)
    }

    pub(crate) const fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }
}

impl<T, E> CheckpointSlot<T, E>
where
    T: Clone,
    E: Clone,
{
    /// Request the checkpoint, snapshotting `ledger.len()` tasks on first call.
    ///
    /// `ledger` holds the success value of every task settled so far and
    /// `first_failure` the earliest failure. Both are consulted so that a
    /// checkpoint requested late still accounts for already-settled tasks.
    ///
    /// Returns the observer handle and whether this call created the
    /// checkpoint.
    pub(crate) fn request(
        &mut self,
        kind: CheckpointKind,
        ledger: &[Option<T>],
        first_failure: Option<&E>,
    ) -> (Checkpoint<T, E>, bool) {
        match self {
            Self::Pending(pending) => return (Checkpoint::new(pending.status.subscribe()), false),
            Self::Settled(status) => return (Checkpoint::new(status.subscribe()), false),
            Self::NotRequested => {}
        }

        let captured_len = ledger.len();
        let resolved = ledger.iter().filter(|slot| slot.is_some()).count();
        let (status, _) = watch::channel(CheckpointStatus::Pending);
        let checkpoint = Checkpoint::new(status.subscribe());

        tracing::debug!(checkpoint = %kind, captured_len, resolved, "checkpoint requested");

        *self = Self::Pending(PendingCheckpoint {
            captured_len,
            resolved,
            status,
        });

        if let Some(reason) = first_failure {
            self.settle(kind, CheckpointStatus::Rejected(reason.clone()));
        } else if resolved == captured_len {
            self.settle(kind, CheckpointStatus::Resolved(collect_results(ledger)));
        }

        (checkpoint, true)
    }

    /// Account for task `index` settling with `outcome`.
    ///
    /// The ledger must already contain the task's value on success.
    pub(crate) fn on_task_settled(
        &mut self,
        kind: CheckpointKind,
        index: usize,
        outcome: &Result<T, E>,
        ledger: &[Option<T>],
    ) {
        let Self::Pending(pending) = self else {
            return;
        };
        if index >= pending.captured_len {
            return;
        }

        let status = match outcome {
            Ok(_) => {
                pending.resolved += 1;
                if pending.resolved < pending.captured_len {
                    return;
                }
                CheckpointStatus::Resolved(collect_results(&ledger[..pending.captured_len]))
            }
            Err(reason) => CheckpointStatus::Rejected(reason.clone()),
        };
        self.settle(kind, status);
    }

    fn settle(&mut self, kind: CheckpointKind, status: CheckpointStatus<T, E>) {
        let slot = std::mem::replace(self, Self::NotRequested);
        let Self::Pending(pending) = slot else {
            *self = slot;
            return;
        };

        match &status {
            CheckpointStatus::Resolved(results) => {
                tracing::debug!(checkpoint = %kind, results = results.len(), "checkpoint resolved");
            }
            CheckpointStatus::Rejected(_) => {
                tracing::debug!(checkpoint = %kind, "checkpoint rejected");
            }
            CheckpointStatus::Pending => {}
        }

        pending.status.send_replace(status);
        *self = Self::Settled(pending.status);
    }
}

fn collect_results<T: Clone>(ledger: &[Option<T>]) -> Vec<T> {
    ledger.iter().flatten().cloned().collect()
}

/// Observer of a `start` or `stop` checkpoint.
///
/// Await it directly (it implements [`IntoFuture`]) or through [`wait`].
/// Every handle for the same checkpoint settles identically.
///
/// [`wait`]: Checkpoint::wait
pub struct Checkpoint<T, E> {
    status: watch::Receiver<CheckpointStatus<T, E>>,
}

impl<T, E> Checkpoint<T, E> {
    fn new(status: watch::Receiver<CheckpointStatus<T, E>>) -> Self {
        Self { status }
    }

    /// Whether the checkpoint has resolved or rejected.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.status.borrow().is_settled()
    }
}

impl<T, E> Checkpoint<T, E>
where
    T: Clone,
    E: Clone,
{
    /// Results of every covered task in enrollment order, or the first
    /// covered failure.
    pub async fn wait(mut self) -> Result<Vec<T>, TaskError<E>> {
        let status = self
            .status
            .wait_for(CheckpointStatus::is_settled)
            .await
            .map_err(|_| TaskError::Abandoned)?;

        match &*status {
            CheckpointStatus::Resolved(results) => Ok(results.clone()),
            CheckpointStatus::Rejected(reason) => Err(TaskError::Failed(reason.clone())),
            CheckpointStatus::Pending => Err(TaskError::Abandoned),
        }
    }
}

impl<T, E> Clone for Checkpoint<T, E> {
    fn clone(&self) -> Self {
        Self {
            status: self.status.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Checkpoint<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoint")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T, E> IntoFuture for Checkpoint<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Output = Result<Vec<T>, TaskError<E>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Slot = CheckpointSlot<u32, String>;

    #[tokio::test]
    async fn test_empty_snapshot_resolves_immediately() {
        let mut slot = Slot::NotRequested;
        let (checkpoint, created) = slot.request(CheckpointKind::Start, &[], None);
        assert!(created);
        assert!(slot.is_settled());
        assert_eq!(checkpoint.await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_resolves_in_index_order_after_all_settle() {
        let mut slot = Slot::NotRequested;
        let mut ledger = vec![None, None, None];
        let (checkpoint, _) = slot.request(CheckpointKind::Start, &ledger, None);

        for (index, value) in [(2, 30), (0, 10), (1, 20)] {
            assert!(!checkpoint.is_settled());
            ledger[index] = Some(value);
            slot.on_task_settled(CheckpointKind::Start, index, &Ok(value), &ledger);
        }

        assert!(checkpoint.is_settled());
        assert_eq!(checkpoint.await, Ok(vec![10, 20, 30]));
    }

    #[tokio::test]
    async fn test_first_failure_wins() {
        let mut slot = Slot::NotRequested;
        let ledger = vec![None, None];
        let (checkpoint, _) = slot.request(CheckpointKind::Stop, &ledger, None);

        slot.on_task_settled(CheckpointKind::Stop, 1, &Err("first".into()), &ledger);
        slot.on_task_settled(CheckpointKind::Stop, 0, &Err("second".into()), &ledger);

        assert_eq!(
            checkpoint.await,
            Err(TaskError::Failed("first".to_string()))
        );
    }

    #[tokio::test]
    async fn test_ignores_tasks_outside_captured_range() {
        let mut slot = Slot::NotRequested;
        let mut ledger = vec![None];
        let (checkpoint, _) = slot.request(CheckpointKind::Start, &ledger, None);

        ledger.push(None);
        slot.on_task_settled(CheckpointKind::Start, 1, &Err("late".into()), &ledger);
        assert!(!checkpoint.is_settled());

        ledger[0] = Some(1);
        slot.on_task_settled(CheckpointKind::Start, 0, &Ok(1), &ledger);
        assert_eq!(checkpoint.await, Ok(vec![1]));
    }

    #[tokio::test]
    async fn test_late_request_sees_settled_results() {
        let mut slot = Slot::NotRequested;
        let ledger = vec![Some(4), Some(5)];
        let (checkpoint, _) = slot.request(CheckpointKind::Stop, &ledger, None);
        assert_eq!(checkpoint.await, Ok(vec![4, 5]));
    }

    #[tokio::test]
    async fn test_late_request_after_failure_rejects() {
        let mut slot = Slot::NotRequested;
        let ledger = vec![Some(4), None];
        let reason = "boom".to_string();
        let (checkpoint, _) = slot.request(CheckpointKind::Stop, &ledger, Some(&reason));
        assert_eq!(checkpoint.await, Err(TaskError::Failed(reason)));
    }

    #[tokio::test]
    async fn test_repeated_request_does_not_resnapshot() {
        let mut slot = Slot::NotRequested;
        let mut ledger = vec![None];
        let (first, created) = slot.request(CheckpointKind::Start, &ledger, None);
        assert!(created);

        ledger.push(None);
        let (second, created) = slot.request(CheckpointKind::Start, &ledger, None);
        assert!(!created);

        ledger[0] = Some(8);
        slot.on_task_settled(CheckpointKind::Start, 0, &Ok(8), &ledger);
        assert_eq!(first.await, Ok(vec![8]));
        assert_eq!(second.await, Ok(vec![8]));
    }

    #[tokio::test]
    async fn test_dropped_slot_abandons_observers() {
        let mut slot = Slot::NotRequested;
        let (checkpoint, _) = slot.request(CheckpointKind::Start, &[None], None);
        drop(slot);
        assert_eq!(checkpoint.await, Err(TaskError::Abandoned));
    }
}
