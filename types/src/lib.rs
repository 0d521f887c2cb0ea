//! Core domain types for the pace task queue.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! `pace-queue` builds the runtime machinery on top of them.

mod error;
mod settings;

pub use error::{QueueTerminated, TaskError};
pub use settings::{ConcurrencyLimit, FailurePolicy, QueueOptions};
