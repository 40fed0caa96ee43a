//! State manager: dispatches updates and outcome tracking by state tag.

use super::policy::BreakerPolicy;
use super::state::BreakerState;
use super::storage::{BreakerStorage, Transition};
use super::BreakerStorageError;
use crate::time::TimeSpan;
use std::sync::Arc;

pub struct StateManager {
    storage: BreakerStorage,
    policy: Arc<dyn BreakerPolicy>,
}

impl StateManager {
    pub fn new(storage: BreakerStorage, policy: Arc<dyn BreakerPolicy>) -> Self {
        Self { storage, policy }
    }

    fn log_transition(key: &str, transition: &Transition) {
        if transition.from != transition.to {
            tracing::debug!(key, from = ?transition.from, to = ?transition.to, "breaker transition");
        }
    }

    /// Advance time-driven transitions (OPEN cooling into HALF_OPEN) and
    /// return the current state. Called before every guarded operation.
    pub async fn update_state(&self, key: &str) -> Result<BreakerState, BreakerStorageError> {
        let policy = Arc::clone(&self.policy);
        let transition = self
            .storage
            .atomic_update(key, move |state, now| match state {
                BreakerState::Closed { .. } => policy.when_closed(state, now),
                BreakerState::Open { .. } => policy.when_opened(state, now),
                BreakerState::HalfOpen { .. } => policy.when_half_opened(state, now),
                BreakerState::Isolated => state.clone(),
            })
            .await?;
        Self::log_transition(key, &transition);
        Ok(transition.to)
    }

    pub async fn track_failure(&self, key: &str) -> Result<BreakerState, BreakerStorageError> {
        let policy = Arc::clone(&self.policy);
        let transition = self
            .storage
            .atomic_update(key, move |state, now| match state {
                BreakerState::Closed { metrics } => {
                    policy.track_failure_when_closed(metrics, now)
                }
                BreakerState::HalfOpen { .. } => policy.track_failure_when_half_open(state, now),
                BreakerState::Open { .. } | BreakerState::Isolated => state.clone(),
            })
            .await?;
        if transition.to.is_open() && !transition.from.is_open() {
            tracing::warn!(key, "circuit breaker tripped open");
        }
        Self::log_transition(key, &transition);
        Ok(transition.to)
    }

    pub async fn track_success(&self, key: &str) -> Result<BreakerState, BreakerStorageError> {
        let policy = Arc::clone(&self.policy);
        let transition = self
            .storage
            .atomic_update(key, move |state, now| match state {
                BreakerState::Closed { metrics } => {
                    policy.track_success_when_closed(metrics, now)
                }
                BreakerState::HalfOpen { .. } => policy.track_success_when_half_open(state, now),
                BreakerState::Open { .. } | BreakerState::Isolated => state.clone(),
            })
            .await?;
        Self::log_transition(key, &transition);
        Ok(transition.to)
    }

    /// Sticky manual trip; only [`StateManager::reset`] leaves it.
    pub async fn isolate(&self, key: &str) -> Result<(), BreakerStorageError> {
        tracing::warn!(key, "circuit breaker isolated");
        self.storage.atomic_update(key, |_, _| BreakerState::Isolated).await?;
        Ok(())
    }

    /// Back to a fresh CLOSED state.
    pub async fn reset(&self, key: &str) -> Result<(), BreakerStorageError> {
        self.storage.remove(key).await
    }

    /// Time remaining before an OPEN state cools down.
    pub fn retry_in(&self, state: &BreakerState) -> TimeSpan {
        match state {
            BreakerState::Open { opened_at, attempt } => {
                let reopens = *opened_at + self.policy.backoff().delay(*attempt, None);
                TimeSpan::from_date_range(self.storage.now(), reopens)
            }
            _ => TimeSpan::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::adapter::MemoryBreakerAdapter;
    use super::super::policy::ConsecutivePolicy;
    use super::*;
    use crate::backoff::Backoff;
    use crate::clock::{Clock, ManualClock};
    use crate::time::Timestamp;

    fn manager(clock: &ManualClock) -> StateManager {
        let adapter = Arc::new(MemoryBreakerAdapter::new());
        let policy: Arc<dyn BreakerPolicy> = Arc::new(ConsecutivePolicy::new(
            3,
            Backoff::constant(TimeSpan::from_millis(200)).without_jitter(),
        ));
        let storage =
            BreakerStorage::new(adapter, Arc::clone(&policy), Arc::new(clock.clone()));
        StateManager::new(storage, policy)
    }

    #[tokio::test]
    async fn full_trip_probe_recover_cycle() {
        let clock = ManualClock::new(Timestamp::from_unix_millis(1_000));
        let manager = manager(&clock);

        for _ in 0..2 {
            assert!(manager.track_failure("k").await.unwrap().is_closed());
        }
        assert!(manager.track_failure("k").await.unwrap().is_open(), "third failure trips");

        assert!(manager.update_state("k").await.unwrap().is_open(), "still cooling down");
        clock.advance_millis(200);
        assert!(manager.update_state("k").await.unwrap().is_half_open());

        // Failed probe: reopen with attempt 2 (backoff unchanged but counted).
        let reopened = manager.track_failure("k").await.unwrap();
        assert_eq!(
            reopened,
            BreakerState::Open { opened_at: clock.now(), attempt: 2 }
        );

        clock.advance_millis(200);
        assert!(manager.update_state("k").await.unwrap().is_half_open());
        assert!(manager.track_success("k").await.unwrap().is_closed(), "good probe closes");
    }

    #[tokio::test]
    async fn isolation_is_sticky_until_reset() {
        let clock = ManualClock::new(Timestamp::from_unix_millis(0));
        let manager = manager(&clock);

        manager.isolate("k").await.unwrap();
        clock.advance_millis(100_000);
        assert!(manager.update_state("k").await.unwrap().is_isolated());
        assert!(manager.track_success("k").await.unwrap().is_isolated());
        assert!(manager.track_failure("k").await.unwrap().is_isolated());

        manager.reset("k").await.unwrap();
        assert!(manager.update_state("k").await.unwrap().is_closed());
    }

    #[tokio::test]
    async fn retry_in_reports_remaining_cooldown() {
        let clock = ManualClock::new(Timestamp::from_unix_millis(0));
        let manager = manager(&clock);

        for _ in 0..3 {
            manager.track_failure("k").await.unwrap();
        }
        let state = manager.update_state("k").await.unwrap();
        assert_eq!(manager.retry_in(&state), TimeSpan::from_millis(200));

        clock.advance_millis(150);
        assert_eq!(manager.retry_in(&state), TimeSpan::from_millis(50));
    }
}
