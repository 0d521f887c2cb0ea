//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing_subscriber::{EnvFilter, fmt};

pub type Op = Box<dyn FnOnce() -> BoxFuture<'static, Result<u32, String>> + Send>;

/// Install a test subscriber honoring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Tracks the number of operations in flight and the highest value seen.
#[derive(Clone, Default)]
pub struct Concurrency {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl Concurrency {
    /// An operation that sleeps `delay_ms` and then yields `outcome`.
    pub fn task(&self, delay_ms: u64, outcome: Result<u32, &'static str>) -> Op {
        let tracker = self.clone();
        Box::new(move || {
            let now = tracker.current.fetch_add(1, Ordering::SeqCst) + 1;
            tracker.peak.fetch_max(now, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                tracker.current.fetch_sub(1, Ordering::SeqCst);
                tracker.completed.fetch_add(1, Ordering::SeqCst);
                outcome.map_err(str::to_string)
            }
            .boxed()
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}
