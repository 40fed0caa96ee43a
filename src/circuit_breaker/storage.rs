//! Breaker state storage over an adapter.

use super::adapter::{BreakerAdapter, BreakerStorageError};
use super::policy::BreakerPolicy;
use super::state::BreakerState;
use crate::clock::Clock;
use crate::time::Timestamp;
use std::sync::Arc;

/// The observed state change of one atomic update. `from == to` when the
/// update was a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: BreakerState,
    pub to: BreakerState,
}

/// Read-modify-write layer between the state manager and the adapter.
///
/// Absent keys read as the policy's initial state, and a write only happens
/// when the policy says the states actually differ.
pub struct BreakerStorage {
    adapter: Arc<dyn BreakerAdapter>,
    policy: Arc<dyn BreakerPolicy>,
    clock: Arc<dyn Clock>,
}

impl BreakerStorage {
    pub fn new(
        adapter: Arc<dyn BreakerAdapter>,
        policy: Arc<dyn BreakerPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { adapter, policy, clock }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub async fn atomic_update<F>(&self, key: &str, update: F) -> Result<Transition, BreakerStorageError>
    where
        F: Fn(&BreakerState, Timestamp) -> BreakerState + Send + Sync,
    {
        let now = self.clock.now();
        let policy = Arc::clone(&self.policy);
        let (previous, written) = self
            .adapter
            .atomic_update(key, &|current| {
                let from = current.cloned().unwrap_or_else(|| policy.initial_state());
                let to = update(&from, now);
                if policy.is_equal(&from, &to) {
                    None
                } else {
                    Some(to)
                }
            })
            .await?;

        let from = previous.unwrap_or_else(|| self.policy.initial_state());
        let to = written.unwrap_or_else(|| from.clone());
        Ok(Transition { from, to })
    }

    pub async fn find(&self, key: &str) -> Result<BreakerState, BreakerStorageError> {
        Ok(self.adapter.find(key).await?.unwrap_or_else(|| self.policy.initial_state()))
    }

    pub async fn remove(&self, key: &str) -> Result<(), BreakerStorageError> {
        self.adapter.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::adapter::MemoryBreakerAdapter;
    use super::super::policy::ConsecutivePolicy;
    use super::*;
    use crate::backoff::Backoff;
    use crate::clock::ManualClock;
    use crate::time::TimeSpan;

    fn storage() -> (Arc<MemoryBreakerAdapter>, BreakerStorage) {
        let adapter = Arc::new(MemoryBreakerAdapter::new());
        let policy = Arc::new(ConsecutivePolicy::new(
            3,
            Backoff::constant(TimeSpan::from_millis(100)).without_jitter(),
        ));
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(0)));
        (Arc::clone(&adapter), BreakerStorage::new(adapter, policy, clock))
    }

    #[tokio::test]
    async fn absent_keys_read_as_initial_state() {
        let (_adapter, storage) = storage();
        assert!(storage.find("k").await.unwrap().is_closed());
    }

    #[tokio::test]
    async fn no_op_updates_skip_the_write() {
        let (adapter, storage) = storage();

        let transition = storage.atomic_update("k", |state, _| state.clone()).await.unwrap();
        assert_eq!(transition.from, transition.to);
        assert_eq!(adapter.find("k").await.unwrap(), None, "identical state is not written");

        let transition =
            storage.atomic_update("k", |_, _| BreakerState::Isolated).await.unwrap();
        assert_eq!(transition.to, BreakerState::Isolated);
        assert_eq!(adapter.find("k").await.unwrap(), Some(BreakerState::Isolated));
    }

    #[tokio::test]
    async fn remove_resets_to_initial() {
        let (_adapter, storage) = storage();
        storage.atomic_update("k", |_, _| BreakerState::Isolated).await.unwrap();
        storage.remove("k").await.unwrap();
        assert!(storage.find("k").await.unwrap().is_closed());
    }
}
