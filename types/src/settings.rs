//! Resolved queue configuration.
//!
//! The raw deserialization struct (a plain integer limit where `0` means
//! "no limit") stays private to this module. It is resolved into
//! [`QueueOptions`] at the parse boundary, so the rest of the workspace only
//! ever sees [`ConcurrencyLimit`].

use std::fmt;
use std::num::NonZeroUsize;

use serde::Deserialize;

/// Maximum number of operations allowed in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConcurrencyLimit {
    /// Every enrolled task is admitted as soon as the queue runs.
    #[default]
    Unbounded,
    Bounded(NonZeroUsize),
}

impl ConcurrencyLimit {
    /// Build from a raw count, where `0` means unbounded.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        match NonZeroUsize::new(limit) {
            Some(n) => Self::Bounded(n),
            None => Self::Unbounded,
        }
    }

    /// Whether another task may start while `running` tasks are in flight.
    #[must_use]
    pub const fn admits(self, running: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(n) => running < n.get(),
        }
    }

    /// The raw count, `0` for unbounded.
    #[must_use]
    pub const fn get(self) -> usize {
        match self {
            Self::Unbounded => 0,
            Self::Bounded(n) => n.get(),
        }
    }
}

impl From<usize> for ConcurrencyLimit {
    fn from(limit: usize) -> Self {
        Self::new(limit)
    }
}

impl fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("unbounded"),
            Self::Bounded(n) => write!(f, "{n}"),
        }
    }
}

/// What the runner does after an operation fails.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop admitting tasks after the first failure. Tasks already in flight
    /// still settle; pending and later-added tasks stay pending.
    #[default]
    Halt,
    /// Keep admitting pending tasks as if the failure were a success.
    Drain,
}

impl FailurePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Drain => "drain",
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQueueOptions {
    #[serde(default)]
    limit: usize,
    #[serde(default)]
    failure_policy: FailurePolicy,
}

/// Validated queue configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawQueueOptions")]
pub struct QueueOptions {
    limit: ConcurrencyLimit,
    failure_policy: FailurePolicy,
}

impl From<RawQueueOptions> for QueueOptions {
    fn from(raw: RawQueueOptions) -> Self {
        Self {
            limit: ConcurrencyLimit::new(raw.limit),
            failure_policy: raw.failure_policy,
        }
    }
}

impl QueueOptions {
    #[must_use]
    pub const fn new(limit: ConcurrencyLimit, failure_policy: FailurePolicy) -> Self {
        Self {
            limit,
            failure_policy,
        }
    }

    /// Set the limit from a raw count, where `0` means unbounded.
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = ConcurrencyLimit::new(limit);
        self
    }

    pub const fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    #[must_use]
    pub const fn limit(&self) -> ConcurrencyLimit {
        self.limit
    }

    #[must_use]
    pub const fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }
}
