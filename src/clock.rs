//! Time sources: reading the wall clock and waiting it out.
//!
//! Every TTL comparison goes through a [`Clock`] and every backoff wait
//! through a [`Sleeper`]. Providers take both as shared trait objects, so a
//! test can pin time with [`ManualClock`], swallow the waits with
//! [`NoOpSleeper`], and drive a blocking acquire or retry loop entirely by
//! hand. The two are deliberately separate: a loop may sleep for real while
//! reading a pinned clock, or the reverse.

use crate::time::{TimeSpan, Timestamp};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current wall-clock time.
///
/// Providers and in-memory adapters take a shared `Arc<dyn Clock>`; handing
/// the same [`ManualClock`] to both makes every expiration deterministic.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Production clock backed by `SystemTime::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
            .unwrap_or(0);
        Timestamp::from_unix_millis(millis)
    }
}

/// Test clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { millis: Arc::new(AtomicU64::new(start.as_unix_millis())) }
    }

    /// Move the clock forward by `millis`.
    pub fn advance_millis(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.as_unix_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Source of waiting for backoff-driven loops.
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    async fn sleep(&self, span: TimeSpan);
}

/// Suspends the task on the tokio timer; the sleeper every provider and
/// middleware defaults to.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuntimeSleeper;

#[async_trait]
impl Sleeper for RuntimeSleeper {
    async fn sleep(&self, span: TimeSpan) {
        tokio::time::sleep(span.to_duration()).await;
    }
}

/// Returns immediately whatever the span. Pairs with [`ManualClock`] to run
/// a wait loop at full speed while the test owns the passage of time.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSleeper;

#[async_trait]
impl Sleeper for NoOpSleeper {
    async fn sleep(&self, _span: TimeSpan) {}
}

/// Skips the wait but remembers every requested span, so a test can assert
/// a loop's cadence instead of measuring elapsed time.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    spans: Arc<Mutex<Vec<TimeSpan>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every span requested so far, in call order.
    pub fn recorded(&self) -> Vec<TimeSpan> {
        self.spans.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Sum of all requested spans.
    pub fn total_requested(&self) -> TimeSpan {
        self.recorded().into_iter().fold(TimeSpan::ZERO, |acc, span| acc + span)
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, span: TimeSpan) {
        self.spans.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(span);
    }
}
