//! Backoff policies for retry loops and blocking acquisition.
//!
//! A policy maps a 1-indexed attempt number (and optionally the observed
//! error) to a delay. Every built-in applies multiplicative jitter: the
//! nominal delay is scaled by `(1 - jitter * r)` with `r ∈ [0, 1)`, so the
//! result always lands in `[(1 - jitter) * nominal, nominal]`.

use crate::time::TimeSpan;
use rand::Rng;
use std::sync::Arc;

/// Default jitter factor applied by every built-in policy.
pub const DEFAULT_JITTER: f64 = 0.5;

/// Default multiplier for [`Backoff::exponential`].
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

type DynamicDelay =
    Arc<dyn Fn(u32, Option<&(dyn std::error::Error + 'static)>) -> TimeSpan + Send + Sync>;

/// Backoff policy for retries and blocking waits.
#[derive(Clone)]
pub enum Backoff {
    /// Fixed delay between attempts.
    Constant { delay: TimeSpan, jitter: f64 },
    /// Delay grows linearly with the attempt number, capped at `max`.
    Linear { min: TimeSpan, max: TimeSpan, jitter: f64 },
    /// Delay grows by `multiplier ^ attempt`, capped at `max`.
    Exponential { min: TimeSpan, max: TimeSpan, multiplier: f64, jitter: f64 },
    /// Delay grows by `attempt ^ degree`, capped at `max`.
    Polynomial { min: TimeSpan, max: TimeSpan, degree: u32, jitter: f64 },
    /// Caller-supplied delay function; receives the attempt number and the
    /// error that triggered the retry, enabling per-error tuning.
    Dynamic(DynamicDelay),
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant { delay, jitter } => {
                f.debug_struct("Constant").field("delay", delay).field("jitter", jitter).finish()
            }
            Self::Linear { min, max, jitter } => f
                .debug_struct("Linear")
                .field("min", min)
                .field("max", max)
                .field("jitter", jitter)
                .finish(),
            Self::Exponential { min, max, multiplier, jitter } => f
                .debug_struct("Exponential")
                .field("min", min)
                .field("max", max)
                .field("multiplier", multiplier)
                .field("jitter", jitter)
                .finish(),
            Self::Polynomial { min, max, degree, jitter } => f
                .debug_struct("Polynomial")
                .field("min", min)
                .field("max", max)
                .field("degree", degree)
                .field("jitter", jitter)
                .finish(),
            Self::Dynamic(_) => f.debug_struct("Dynamic").finish_non_exhaustive(),
        }
    }
}

impl Backoff {
    /// Fixed delay with the default jitter.
    pub fn constant(delay: TimeSpan) -> Self {
        Self::Constant { delay, jitter: DEFAULT_JITTER }
    }

    /// Linear backoff with the stock `1s..6s` range.
    pub fn linear() -> Self {
        Self::linear_between(TimeSpan::from_secs(1), TimeSpan::from_secs(6))
    }

    pub fn linear_between(min: TimeSpan, max: TimeSpan) -> Self {
        Self::Linear { min, max, jitter: DEFAULT_JITTER }
    }

    /// Exponential backoff doubling each attempt, `1s..60s`.
    pub fn exponential() -> Self {
        Self::exponential_between(TimeSpan::from_secs(1), TimeSpan::from_secs(60))
    }

    pub fn exponential_between(min: TimeSpan, max: TimeSpan) -> Self {
        Self::Exponential { min, max, multiplier: DEFAULT_MULTIPLIER, jitter: DEFAULT_JITTER }
    }

    /// Quadratic backoff, `1s..60s`.
    pub fn polynomial() -> Self {
        Self::Polynomial {
            min: TimeSpan::from_secs(1),
            max: TimeSpan::from_secs(60),
            degree: 2,
            jitter: DEFAULT_JITTER,
        }
    }

    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(u32, Option<&(dyn std::error::Error + 'static)>) -> TimeSpan
            + Send
            + Sync
            + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    /// Replace the jitter factor. Values are clamped to `[0, 1]`.
    /// No effect on [`Backoff::Dynamic`].
    pub fn with_jitter(mut self, j: f64) -> Self {
        let j = j.clamp(0.0, 1.0);
        match &mut self {
            Self::Constant { jitter, .. }
            | Self::Linear { jitter, .. }
            | Self::Exponential { jitter, .. }
            | Self::Polynomial { jitter, .. } => *jitter = j,
            Self::Dynamic(_) => {}
        }
        self
    }

    /// Disable jitter entirely; the nominal delay is returned as-is.
    pub fn without_jitter(self) -> Self {
        self.with_jitter(0.0)
    }

    /// Compute the (jittered) delay for a 1-indexed attempt.
    pub fn delay(&self, attempt: u32, error: Option<&(dyn std::error::Error + 'static)>) -> TimeSpan {
        self.delay_with_rng(attempt, error, &mut rand::rng())
    }

    /// Same as [`Backoff::delay`] but with a caller-supplied RNG, for
    /// deterministic tests.
    pub fn delay_with_rng<R: Rng + ?Sized>(
        &self,
        attempt: u32,
        error: Option<&(dyn std::error::Error + 'static)>,
        rng: &mut R,
    ) -> TimeSpan {
        let attempt = attempt.max(1);
        let (nominal, jitter) = match self {
            Self::Constant { delay, jitter } => (delay.as_millis().max(0) as f64, *jitter),
            Self::Linear { min, max, jitter } => {
                let raw = min.as_millis().max(0) as f64 * attempt as f64;
                (raw.min(max.as_millis().max(0) as f64), *jitter)
            }
            Self::Exponential { min, max, multiplier, jitter } => {
                let raw = min.as_millis().max(0) as f64 * multiplier.powi(attempt as i32);
                (raw.min(max.as_millis().max(0) as f64), *jitter)
            }
            Self::Polynomial { min, max, degree, jitter } => {
                let raw = min.as_millis().max(0) as f64 * (attempt as f64).powi(*degree as i32);
                (raw.min(max.as_millis().max(0) as f64), *jitter)
            }
            Self::Dynamic(f) => return f(attempt, error),
        };

        let scaled = if jitter > 0.0 {
            let r: f64 = rng.random_range(0.0..1.0);
            nominal * (1.0 - jitter * r)
        } else {
            nominal
        };
        TimeSpan::from_millis(scaled.round() as i64)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn millis(span: TimeSpan) -> i64 {
        span.as_millis()
    }

    #[test]
    fn constant_ignores_attempt() {
        let backoff = Backoff::constant(TimeSpan::from_millis(100)).without_jitter();
        assert_eq!(millis(backoff.delay(1, None)), 100);
        assert_eq!(millis(backoff.delay(7, None)), 100);
    }

    #[test]
    fn linear_scales_and_caps() {
        let backoff =
            Backoff::linear_between(TimeSpan::from_millis(100), TimeSpan::from_millis(350))
                .without_jitter();
        assert_eq!(millis(backoff.delay(1, None)), 100);
        assert_eq!(millis(backoff.delay(2, None)), 200);
        assert_eq!(millis(backoff.delay(3, None)), 300);
        assert_eq!(millis(backoff.delay(4, None)), 350);
        assert_eq!(millis(backoff.delay(100, None)), 350);
    }

    #[test]
    fn exponential_multiplies_per_attempt() {
        let backoff =
            Backoff::exponential_between(TimeSpan::from_millis(100), TimeSpan::from_secs(10))
                .without_jitter();
        assert_eq!(millis(backoff.delay(1, None)), 200);
        assert_eq!(millis(backoff.delay(2, None)), 400);
        assert_eq!(millis(backoff.delay(3, None)), 800);
    }

    #[test]
    fn exponential_caps_at_max() {
        let backoff =
            Backoff::exponential_between(TimeSpan::from_millis(100), TimeSpan::from_millis(500))
                .without_jitter();
        assert_eq!(millis(backoff.delay(10, None)), 500);
    }

    #[test]
    fn polynomial_raises_attempt_to_degree() {
        let backoff = Backoff::Polynomial {
            min: TimeSpan::from_millis(10),
            max: TimeSpan::from_secs(10),
            degree: 3,
            jitter: 0.0,
        };
        assert_eq!(millis(backoff.delay(1, None)), 10);
        assert_eq!(millis(backoff.delay(2, None)), 80);
        assert_eq!(millis(backoff.delay(3, None)), 270);
    }

    #[test]
    fn jittered_delay_stays_in_bounds() {
        let backoff = Backoff::constant(TimeSpan::from_millis(1_000)).with_jitter(0.5);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let d = millis(backoff.delay_with_rng(1, None, &mut rng));
            assert!((500..=1_000).contains(&d), "delay {d} outside [500, 1000]");
        }
    }

    #[test]
    fn full_jitter_can_reach_near_zero() {
        let backoff = Backoff::constant(TimeSpan::from_millis(1_000)).with_jitter(1.0);
        let mut rng = StdRng::seed_from_u64(42);
        let mut lowest = i64::MAX;
        for _ in 0..500 {
            lowest = lowest.min(millis(backoff.delay_with_rng(1, None, &mut rng)));
        }
        assert!(lowest < 100, "expected near-zero delays with jitter=1, lowest={lowest}");
    }

    #[test]
    fn dynamic_policy_sees_the_error() {
        let backoff = Backoff::dynamic(|attempt, error| {
            if error.is_some() {
                TimeSpan::from_millis(attempt as i64 * 2)
            } else {
                TimeSpan::ZERO
            }
        });
        let err = std::io::Error::other("boom");
        assert_eq!(millis(backoff.delay(3, Some(&err))), 6);
        assert_eq!(millis(backoff.delay(3, None)), 0);
    }

    #[test]
    fn attempt_zero_is_treated_as_one() {
        let backoff =
            Backoff::linear_between(TimeSpan::from_millis(100), TimeSpan::from_secs(1))
                .without_jitter();
        assert_eq!(millis(backoff.delay(0, None)), 100);
    }
}
