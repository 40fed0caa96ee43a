//! Millisecond-precision durations and wall-clock timestamps.
//!
//! Every TTL, backoff delay, and expiration in this crate flows through
//! [`TimeSpan`] and [`Timestamp`]. Both are plain integer milliseconds so
//! they survive a round-trip through any backend unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::time::Duration;

/// A signed duration stored as whole milliseconds.
///
/// Spans may be negative as the result of arithmetic (`a - b`); conversion
/// to [`Duration`] clamps negatives to zero. All constructors and accessors
/// round-trip through milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSpan {
    millis: i64,
}

impl TimeSpan {
    pub const ZERO: TimeSpan = TimeSpan { millis: 0 };

    pub const fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self { millis: secs.saturating_mul(1_000) }
    }

    pub const fn from_mins(mins: i64) -> Self {
        Self { millis: mins.saturating_mul(60_000) }
    }

    pub const fn from_hours(hours: i64) -> Self {
        Self { millis: hours.saturating_mul(3_600_000) }
    }

    pub const fn from_days(days: i64) -> Self {
        Self { millis: days.saturating_mul(86_400_000) }
    }

    /// Span between two timestamps, `b - a`. Negative when `b` precedes `a`.
    pub fn from_date_range(a: Timestamp, b: Timestamp) -> Self {
        Self { millis: b.millis as i64 - a.millis as i64 }
    }

    pub const fn as_millis(&self) -> i64 {
        self.millis
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.millis as f64 / 1_000.0
    }

    pub const fn is_negative(&self) -> bool {
        self.millis < 0
    }

    pub const fn is_zero(&self) -> bool {
        self.millis == 0
    }

    /// Absolute deadline `now + self`.
    pub fn to_end_date(&self, now: Timestamp) -> Timestamp {
        now + *self
    }

    /// Non-negative `Duration` view; negative spans become zero.
    pub fn to_duration(&self) -> Duration {
        Duration::from_millis(self.millis.max(0) as u64)
    }
}

impl From<Duration> for TimeSpan {
    fn from(d: Duration) -> Self {
        Self { millis: d.as_millis().min(i64::MAX as u128) as i64 }
    }
}

impl Add for TimeSpan {
    type Output = TimeSpan;

    fn add(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan { millis: self.millis.saturating_add(rhs.millis) }
    }
}

impl Sub for TimeSpan {
    type Output = TimeSpan;

    fn sub(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan { millis: self.millis.saturating_sub(rhs.millis) }
    }
}

impl Mul<u32> for TimeSpan {
    type Output = TimeSpan;

    fn mul(self, rhs: u32) -> TimeSpan {
        TimeSpan { millis: self.millis.saturating_mul(rhs as i64) }
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.millis)
    }
}

/// Wall-clock instant as whole milliseconds since the Unix epoch.
///
/// Expirations are compared across processes, so this is wall time, not a
/// process-local monotonic reading. Callers needing monotonicity must keep
/// their own `Instant`s.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp {
    millis: u64,
}

impl Timestamp {
    pub const fn from_unix_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub const fn as_unix_millis(&self) -> u64 {
        self.millis
    }

    /// Span elapsed since `earlier`; negative if `earlier` is in the future.
    pub fn elapsed_since(&self, earlier: Timestamp) -> TimeSpan {
        TimeSpan::from_date_range(earlier, *self)
    }
}

impl Add<TimeSpan> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: TimeSpan) -> Timestamp {
        let millis = if rhs.millis >= 0 {
            self.millis.saturating_add(rhs.millis as u64)
        } else {
            self.millis.saturating_sub(rhs.millis.unsigned_abs())
        };
        Timestamp { millis }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.millis)
    }
}
