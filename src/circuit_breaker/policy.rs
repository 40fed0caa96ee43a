//! Tripping policies.
//!
//! A policy owns every state transition decision: what CLOSED metrics look
//! like, when they trip to OPEN, and how OPEN cools down into HALF_OPEN via
//! its backoff. The open/half-open plumbing is shared through default
//! methods; concrete policies only decide when to trip.

use super::state::{BreakerState, Metrics, SampleBucket};
use crate::backoff::Backoff;
use crate::time::{TimeSpan, Timestamp};
use std::collections::VecDeque;

/// Transition rules for one breaker.
pub trait BreakerPolicy: Send + Sync {
    /// Cool-down schedule for the OPEN state, by reopen attempt.
    fn backoff(&self) -> &Backoff;

    /// Fresh CLOSED metrics in this policy's shape.
    fn initial_metrics(&self) -> Metrics;

    fn initial_state(&self) -> BreakerState {
        BreakerState::Closed { metrics: self.initial_metrics() }
    }

    /// Storage writes only when states differ under this equality.
    fn is_equal(&self, a: &BreakerState, b: &BreakerState) -> bool {
        a == b
    }

    /// Record a failure while CLOSED; may trip to OPEN.
    fn track_failure_when_closed(&self, metrics: &Metrics, now: Timestamp) -> BreakerState;

    /// Record a success while CLOSED.
    fn track_success_when_closed(&self, metrics: &Metrics, now: Timestamp) -> BreakerState;

    fn when_closed(&self, state: &BreakerState, _now: Timestamp) -> BreakerState {
        state.clone()
    }

    /// OPEN cools down into HALF_OPEN once `opened_at + backoff(attempt)`
    /// passes.
    fn when_opened(&self, state: &BreakerState, now: Timestamp) -> BreakerState {
        match state {
            BreakerState::Open { opened_at, attempt } => {
                if now >= *opened_at + self.backoff().delay(*attempt, None) {
                    BreakerState::HalfOpen { attempt: *attempt }
                } else {
                    state.clone()
                }
            }
            _ => state.clone(),
        }
    }

    fn when_half_opened(&self, state: &BreakerState, _now: Timestamp) -> BreakerState {
        state.clone()
    }

    /// A failed probe reopens with the next attempt number.
    fn track_failure_when_half_open(&self, state: &BreakerState, now: Timestamp) -> BreakerState {
        match state {
            BreakerState::HalfOpen { attempt } => {
                BreakerState::Open { opened_at: now, attempt: attempt.saturating_add(1) }
            }
            _ => state.clone(),
        }
    }

    /// A successful probe closes the circuit with fresh metrics.
    fn track_success_when_half_open(&self, _state: &BreakerState, _now: Timestamp) -> BreakerState {
        self.initial_state()
    }
}

/// Trips after N consecutive failures.
pub struct ConsecutivePolicy {
    threshold: u32,
    backoff: Backoff,
}

impl ConsecutivePolicy {
    pub fn new(threshold: u32, backoff: Backoff) -> Self {
        Self { threshold: threshold.max(1), backoff }
    }
}

impl BreakerPolicy for ConsecutivePolicy {
    fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    fn initial_metrics(&self) -> Metrics {
        Metrics::Consecutive { failures: 0 }
    }

    fn track_failure_when_closed(&self, metrics: &Metrics, now: Timestamp) -> BreakerState {
        let failures = match metrics {
            Metrics::Consecutive { failures } => failures.saturating_add(1),
            _ => 1,
        };
        if failures >= self.threshold {
            BreakerState::Open { opened_at: now, attempt: 1 }
        } else {
            BreakerState::Closed { metrics: Metrics::Consecutive { failures } }
        }
    }

    fn track_success_when_closed(&self, _metrics: &Metrics, _now: Timestamp) -> BreakerState {
        self.initial_state()
    }
}

/// Trips when the last `window` calls contain at least `threshold` failures.
pub struct CountPolicy {
    threshold: u32,
    window: usize,
    backoff: Backoff,
}

impl CountPolicy {
    pub fn new(threshold: u32, window: usize, backoff: Backoff) -> Self {
        Self { threshold: threshold.max(1), window: window.max(1), backoff }
    }

    fn record(&self, metrics: &Metrics, is_failure: bool, now: Timestamp) -> BreakerState {
        let mut outcomes = match metrics {
            Metrics::Count { outcomes } => outcomes.clone(),
            _ => VecDeque::new(),
        };
        outcomes.push_back(is_failure);
        while outcomes.len() > self.window {
            outcomes.pop_front();
        }
        let failures = outcomes.iter().filter(|failed| **failed).count() as u32;
        if failures >= self.threshold {
            BreakerState::Open { opened_at: now, attempt: 1 }
        } else {
            BreakerState::Closed { metrics: Metrics::Count { outcomes } }
        }
    }
}

impl BreakerPolicy for CountPolicy {
    fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    fn initial_metrics(&self) -> Metrics {
        Metrics::Count { outcomes: VecDeque::new() }
    }

    fn track_failure_when_closed(&self, metrics: &Metrics, now: Timestamp) -> BreakerState {
        self.record(metrics, true, now)
    }

    fn track_success_when_closed(&self, metrics: &Metrics, now: Timestamp) -> BreakerState {
        self.record(metrics, false, now)
    }
}

/// Trips on the failure ratio over a time-bucketed sampling window.
pub struct SamplingPolicy {
    threshold: f64,
    min_samples: u64,
    window: TimeSpan,
    bucket_width: TimeSpan,
    backoff: Backoff,
}

impl SamplingPolicy {
    /// `threshold` is the failure ratio in `[0, 1]`; `buckets` subdivide
    /// the sampling `window`.
    pub fn new(
        threshold: f64,
        min_samples: u64,
        window: TimeSpan,
        buckets: u32,
        backoff: Backoff,
    ) -> Self {
        let buckets = buckets.max(1);
        let width = TimeSpan::from_millis((window.as_millis() / buckets as i64).max(1));
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            min_samples: min_samples.max(1),
            window,
            bucket_width: width,
            backoff,
        }
    }

    fn record(&self, metrics: &Metrics, is_failure: bool, now: Timestamp) -> BreakerState {
        let mut buckets = match metrics {
            Metrics::Sampling { buckets } => buckets.clone(),
            _ => VecDeque::new(),
        };

        let horizon = now + (TimeSpan::ZERO - self.window);
        while buckets.front().is_some_and(|bucket| bucket.start + self.bucket_width < horizon) {
            buckets.pop_front();
        }

        let needs_new_bucket =
            buckets.back().map_or(true, |bucket| now >= bucket.start + self.bucket_width);
        if needs_new_bucket {
            buckets.push_back(SampleBucket { start: now, failures: 0, successes: 0 });
        }
        let current = buckets.back_mut().expect("bucket just ensured");
        if is_failure {
            current.failures += 1;
        } else {
            current.successes += 1;
        }

        let samples: u64 = buckets.iter().map(SampleBucket::samples).sum();
        let failures: u64 = buckets.iter().map(|bucket| bucket.failures).sum();
        if samples >= self.min_samples && failures as f64 / samples as f64 >= self.threshold {
            BreakerState::Open { opened_at: now, attempt: 1 }
        } else {
            BreakerState::Closed { metrics: Metrics::Sampling { buckets } }
        }
    }
}

impl BreakerPolicy for SamplingPolicy {
    fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    fn initial_metrics(&self) -> Metrics {
        Metrics::Sampling { buckets: VecDeque::new() }
    }

    fn track_failure_when_closed(&self, metrics: &Metrics, now: Timestamp) -> BreakerState {
        self.record(metrics, true, now)
    }

    fn track_success_when_closed(&self, metrics: &Metrics, now: Timestamp) -> BreakerState {
        self.record(metrics, false, now)
    }
}
