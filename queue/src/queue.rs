//! The bounded task queue and its admission pump.
//!
//! All queue state sits behind one mutex that is only held for synchronous
//! bookkeeping. Operations are invoked and spawned after the lock is
//! released, so an operation may call back into the queue (e.g. `add`).

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pace_types::{ConcurrencyLimit, FailurePolicy, QueueOptions, QueueTerminated, TaskError};
use tokio::sync::oneshot;

use crate::checkpoint::{Checkpoint, CheckpointKind, CheckpointSlot};
use crate::task::{Operation, Task, TaskHandle, boxed_operation};

/// Admits asynchronous operations up to a concurrency limit and reports
/// their results through `start`/`stop` checkpoints and per-task handles.
///
/// Cloning is cheap; clones share the same queue.
///
/// Tasks run on the ambient Tokio runtime: `start`, `stop`, and `add` on a
/// started queue spawn work and must be called from within a runtime.
pub struct TaskQueue<T, E> {
    inner: Arc<Inner<T, E>>,
}

struct Inner<T, E> {
    options: QueueOptions,
    state: Mutex<QueueState<T, E>>,
}

struct QueueState<T, E> {
    /// Enrolled, not yet admitted, lowest index first.
    pending: VecDeque<Task<T, E>>,
    /// Admitted and not yet settled.
    running: usize,
    /// One slot per enrolled task; `Some` once the task succeeded.
    ledger: Vec<Option<T>>,
    first_failure: Option<E>,
    start: CheckpointSlot<T, E>,
    stop: CheckpointSlot<T, E>,
}

impl<T, E> QueueState<T, E> {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            running: 0,
            ledger: Vec::new(),
            first_failure: None,
            start: CheckpointSlot::NotRequested,
            stop: CheckpointSlot::NotRequested,
        }
    }

    fn enqueue(
        &mut self,
        operation: Operation<T, E>,
        owner: Option<oneshot::Sender<Result<T, E>>>,
    ) -> usize {
        let index = self.ledger.len();
        self.ledger.push(None);
        self.pending.push_back(Task {
            index,
            operation,
            owner,
        });
        index
    }

    fn is_started(&self) -> bool {
        self.start.is_requested() || self.stop.is_requested()
    }

    fn is_sealed(&self) -> bool {
        self.stop.is_requested()
    }

    fn is_halted(&self, policy: FailurePolicy) -> bool {
        policy == FailurePolicy::Halt && self.first_failure.is_some()
    }
}

impl<T, E> QueueState<T, E>
where
    T: Clone,
    E: Clone,
{
    fn request(&mut self, kind: CheckpointKind) -> (Checkpoint<T, E>, bool) {
        let Self {
            ledger,
            first_failure,
            start,
            stop,
            ..
        } = self;
        let slot = match kind {
            CheckpointKind::Start => start,
            CheckpointKind::Stop => stop,
        };
        slot.request(kind, ledger, first_failure.as_ref())
    }

    fn record(&mut self, index: usize, outcome: &Result<T, E>) {
        match outcome {
            Ok(value) => self.ledger[index] = Some(value.clone()),
            Err(reason) => {
                if self.first_failure.is_none() {
                    self.first_failure = Some(reason.clone());
                }
            }
        }

        self.start
            .on_task_settled(CheckpointKind::Start, index, outcome, &self.ledger);
        self.stop
            .on_task_settled(CheckpointKind::Stop, index, outcome, &self.ledger);
    }
}

impl<T, E> Inner<T, E> {
    fn lock(&self) -> MutexGuard<'_, QueueState<T, E>> {
        // Bookkeeping never panics midway, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, E> Inner<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Admit pending tasks while the limit allows and no failure halted the queue.
    fn pump(self: &Arc<Self>) {
        let limit = self.options.limit();
        let admitted: Vec<Task<T, E>> = {
            let mut state = self.lock();
            if state.is_halted(self.options.failure_policy()) {
                return;
            }
            let mut admitted = Vec::new();
            while limit.admits(state.running) {
                let Some(task) = state.pending.pop_front() else {
                    break;
                };
                state.running += 1;
                admitted.push(task);
            }
            if !admitted.is_empty() {
                tracing::trace!(
                    admitted = admitted.len(),
                    running = state.running,
                    pending = state.pending.len(),
                    %limit,
                    "admitted tasks"
                );
            }
            admitted
        };

        for task in admitted {
            self.spawn(task);
        }
    }

    fn spawn(self: &Arc<Self>, task: Task<T, E>) {
        let Task {
            index,
            operation,
            owner,
        } = task;
        let inner = Arc::clone(self);
        let future = operation();

        tokio::spawn(async move {
            let outcome = future.await;
            if inner.settle(index, owner, outcome) {
                inner.pump();
            }
        });
    }

    /// Record a settled task. Returns whether admission should continue.
    fn settle(
        &self,
        index: usize,
        owner: Option<oneshot::Sender<Result<T, E>>>,
        outcome: Result<T, E>,
    ) -> bool {
        let mut state = self.lock();
        state.running -= 1;

        if let Some(owner) = owner {
            // The caller may have dropped its handle; checkpoints still count the task.
            let _ = owner.send(outcome.clone());
        }

        state.record(index, &outcome);

        let policy = self.options.failure_policy();
        if outcome.is_ok() {
            tracing::trace!(index, running = state.running, "task succeeded");
        } else {
            tracing::debug!(
                index,
                running = state.running,
                pending = state.pending.len(),
                policy = policy.as_str(),
                "task failed"
            );
        }
        !state.is_halted(policy)
    }
}

impl<T, E> TaskQueue<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a queue pre-enrolled with `operations`, in iteration order.
    ///
    /// Nothing runs until [`start`](Self::start) or [`stop`](Self::stop).
    pub fn new<I, F, Fut>(operations: I, options: QueueOptions) -> Self
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let queue = Self::empty(options);
        {
            let mut state = queue.inner.lock();
            for operation in operations {
                state.enqueue(boxed_operation(operation), None);
            }
            tracing::debug!(
                enrolled = state.ledger.len(),
                limit = %options.limit(),
                "queue created"
            );
        }
        queue
    }

    /// Create a queue with no pre-enrolled tasks.
    pub fn empty(options: QueueOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                state: Mutex::new(QueueState::new()),
            }),
        }
    }

    /// Enroll `operation` and return a handle to its own outcome.
    ///
    /// If the queue has started and has a free slot, admission runs right
    /// away; otherwise the task waits its turn behind earlier tasks.
    pub fn add<F, Fut>(&self, operation: F) -> Result<TaskHandle<T, E>, QueueTerminated>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (owner, outcome) = oneshot::channel();
        let (index, resume) = {
            let mut state = self.inner.lock();
            if state.is_sealed() {
                tracing::warn!(
                    enrolled = state.ledger.len(),
                    "rejected task added after stop"
                );
                return Err(QueueTerminated);
            }
            let index = state.enqueue(boxed_operation(operation), Some(owner));
            let resume = state.is_started() && self.inner.options.limit().admits(state.running);
            (index, resume)
        };

        tracing::debug!(index, resume, "task added");
        if resume {
            self.inner.pump();
        }
        Ok(TaskHandle::new(index, outcome))
    }

    /// Request the `start` checkpoint: every task enrolled so far.
    ///
    /// The first call snapshots the task count and runs the queue; later
    /// calls observe the same checkpoint.
    pub fn start(&self) -> Checkpoint<T, E> {
        self.request(CheckpointKind::Start)
    }

    /// Request the `stop` checkpoint and seal the queue against `add`.
    ///
    /// Covers every task enrolled at the time of the first call, including
    /// those added after `start`. Runs the queue if `start` never did.
    pub fn stop(&self) -> Checkpoint<T, E> {
        self.request(CheckpointKind::Stop)
    }

    fn request(&self, kind: CheckpointKind) -> Checkpoint<T, E> {
        let (checkpoint, created) = self.inner.lock().request(kind);
        if created {
            self.inner.pump();
        }
        checkpoint
    }
}

impl<T, E> TaskQueue<T, E> {
    fn state(&self) -> MutexGuard<'_, QueueState<T, E>> {
        self.inner.lock()
    }

    /// Number of tasks ever enrolled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().ledger.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn limit(&self) -> ConcurrencyLimit {
        self.inner.options.limit()
    }

    #[must_use]
    pub fn options(&self) -> QueueOptions {
        self.inner.options
    }

    /// Tasks admitted and not yet settled.
    #[must_use]
    pub fn running(&self) -> usize {
        self.state().running
    }

    /// Tasks enrolled but not yet admitted.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state().pending.len()
    }

    /// Whether `stop` has been requested.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state().is_sealed()
    }

    /// Whether the `start` checkpoint has been requested and has settled.
    #[must_use]
    pub fn start_settled(&self) -> bool {
        self.state().start.is_settled()
    }

    /// Whether the `stop` checkpoint has been requested and has settled.
    #[must_use]
    pub fn stop_settled(&self) -> bool {
        self.state().stop.is_settled()
    }
}

impl<T, E> Clone for TaskQueue<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for TaskQueue<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("TaskQueue")
            .field("enrolled", &state.ledger.len())
            .field("pending", &state.pending.len())
            .field("running", &state.running)
            .field("limit", &self.inner.options.limit())
            .field("failure_policy", &self.inner.options.failure_policy())
            .finish_non_exhaustive()
    }
}

/// Run `operations` with at most `limit` in flight (`0` = unbounded) and
/// collect their results in input order.
///
/// Rejects with the first failure; under the default policy no further
/// operations are started after it.
pub async fn async_limit<I, F, Fut, T, E>(operations: I, limit: usize) -> Result<Vec<T>, TaskError<E>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let queue = TaskQueue::new(operations, QueueOptions::default().with_limit(limit));
    queue.start().await
}
