//! Bounded-concurrency async task queue.
//!
//! A [`TaskQueue`] admits asynchronous operations in enrollment order, never
//! running more than its [`ConcurrencyLimit`] at once. Results are observed
//! through two checkpoints over the same task set:
//!
//! - [`TaskQueue::start`] covers the tasks enrolled when it is first called.
//! - [`TaskQueue::stop`] covers every task enrolled when it is first called
//!   and seals the queue against further [`TaskQueue::add`].
//!
//! Each checkpoint resolves with results in enrollment order, or rejects with
//! the first failure among the tasks it covers. Tasks enrolled through `add`
//! also get their own [`TaskHandle`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use pace_queue::{QueueOptions, TaskQueue};
//!
//! let queue = TaskQueue::<u32, String>::empty(QueueOptions::default().with_limit(2));
//! let first = queue.add(|| async { Ok(1) })?;
//! let started = queue.start();
//! let second = queue.add(|| async { Ok(2) })?;
//!
//! assert_eq!(started.await?, vec![1]);
//! assert_eq!(queue.stop().await?, vec![1, 2]);
//! assert_eq!((first.await?, second.await?), (1, 2));
//! # Ok(())
//! # }
//! ```

pub mod config;

mod checkpoint;
mod queue;
mod task;


pub use checkpoint::Checkpoint;
pub use pace_types::{ConcurrencyLimit, FailurePolicy, QueueOptions, QueueTerminated, TaskError};
pub use queue::{TaskQueue, async_limit};
pub use task::TaskHandle;
