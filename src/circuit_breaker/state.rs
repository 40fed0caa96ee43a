//! Circuit breaker state and policy metrics.
//!
//! The whole state is a serde-serializable blob so it can live in any
//! backend and be shared across processes.

use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Externally observable breaker state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls flow; the policy tracks outcomes in its metrics.
    Closed { metrics: Metrics },
    /// Calls are rejected until the backoff for `attempt` elapses.
    Open { opened_at: Timestamp, attempt: u32 },
    /// One probe call is allowed through.
    HalfOpen { attempt: u32 },
    /// Manually tripped; sticky until reset.
    Isolated,
}

impl BreakerState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen { .. })
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self, Self::Isolated)
    }
}

/// Policy-shaped failure bookkeeping inside the CLOSED state.
///
/// A policy reading metrics of a foreign shape treats them as its own
/// initial metrics, so switching policies on a live key is safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metrics {
    /// Consecutive failure counter.
    Consecutive { failures: u32 },
    /// Rolling window of the last N call outcomes (`true` = failure).
    Count { outcomes: VecDeque<bool> },
    /// Time-bucketed failure samples.
    Sampling { buckets: VecDeque<SampleBucket> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBucket {
    pub start: Timestamp,
    pub failures: u64,
    pub successes: u64,
}

impl SampleBucket {
    pub fn samples(&self) -> u64 {
        self.failures + self.successes
    }
}
