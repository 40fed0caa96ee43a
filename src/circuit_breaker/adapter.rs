//! Circuit breaker storage adapter contract.

use super::state::BreakerState;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Raised when the breaker's backing store fails.
#[derive(Debug, Clone, Error)]
#[error("circuit breaker backend failed")]
pub struct BreakerStorageError(#[source] pub Arc<dyn std::error::Error + Send + Sync>);

impl BreakerStorageError {
    pub fn new(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(cause))
    }
}

/// State update applied inside the adapter's atomic section. Returning
/// `None` leaves the stored state untouched.
pub type StateUpdate<'a> =
    &'a (dyn Fn(Option<&BreakerState>) -> Option<BreakerState> + Send + Sync);

/// Backend contract for breaker state.
///
/// `atomic_update` is the whole point: the read-modify-write must be a
/// single unit (mutex section, transaction, or server-side script), or two
/// processes tracking outcomes concurrently will lose updates.
#[async_trait]
pub trait BreakerAdapter: Send + Sync {
    async fn find(&self, key: &str) -> Result<Option<BreakerState>, BreakerStorageError>;

    async fn remove(&self, key: &str) -> Result<(), BreakerStorageError>;

    /// Apply `update` atomically; returns `(previous, written)` where
    /// `written` is `None` when the update declined to write.
    async fn atomic_update(
        &self,
        key: &str,
        update: StateUpdate<'_>,
    ) -> Result<(Option<BreakerState>, Option<BreakerState>), BreakerStorageError>;
}

/// Process-local [`BreakerAdapter`].
#[derive(Debug, Default)]
pub struct MemoryBreakerAdapter {
    states: Mutex<HashMap<String, BreakerState>>,
}

impl MemoryBreakerAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<String, BreakerState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BreakerAdapter for MemoryBreakerAdapter {
    async fn find(&self, key: &str) -> Result<Option<BreakerState>, BreakerStorageError> {
        Ok(self.lock_states().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), BreakerStorageError> {
        self.lock_states().remove(key);
        Ok(())
    }

    async fn atomic_update(
        &self,
        key: &str,
        update: StateUpdate<'_>,
    ) -> Result<(Option<BreakerState>, Option<BreakerState>), BreakerStorageError> {
        let mut states = self.lock_states();
        let previous = states.get(key).cloned();
        let written = update(previous.as_ref());
        if let Some(next) = &written {
            states.insert(key.to_string(), next.clone());
        }
        Ok((previous, written))
    }
}

/// Backend-free adapter: nothing persists, so every read defaults to the
/// policy's initial (CLOSED) state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpBreakerAdapter;

#[async_trait]
impl BreakerAdapter for NoOpBreakerAdapter {
    async fn find(&self, _key: &str) -> Result<Option<BreakerState>, BreakerStorageError> {
        Ok(None)
    }

    async fn remove(&self, _key: &str) -> Result<(), BreakerStorageError> {
        Ok(())
    }

    async fn atomic_update(
        &self,
        _key: &str,
        update: StateUpdate<'_>,
    ) -> Result<(Option<BreakerState>, Option<BreakerState>), BreakerStorageError> {
        // Evaluate for the caller's benefit, then drop the write.
        let _ = update(None);
        Ok((None, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::state::Metrics;

    fn closed(failures: u32) -> BreakerState {
        BreakerState::Closed { metrics: Metrics::Consecutive { failures } }
    }

    #[tokio::test]
    async fn atomic_update_reports_previous_and_written() {
        let adapter = MemoryBreakerAdapter::new();

        let (previous, written) =
            adapter.atomic_update("k", &|current| match current {
                None => Some(closed(1)),
                Some(_) => None,
            })
            .await
            .unwrap();
        assert_eq!(previous, None);
        assert_eq!(written, Some(closed(1)));

        let (previous, written) = adapter.atomic_update("k", &|_| None).await.unwrap();
        assert_eq!(previous, Some(closed(1)));
        assert_eq!(written, None);
        assert_eq!(adapter.find("k").await.unwrap(), Some(closed(1)));
    }

    #[tokio::test]
    async fn remove_clears_the_key() {
        let adapter = MemoryBreakerAdapter::new();
        adapter.atomic_update("k", &|_| Some(BreakerState::Isolated)).await.unwrap();
        adapter.remove("k").await.unwrap();
        assert_eq!(adapter.find("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn noop_adapter_never_persists() {
        let adapter = NoOpBreakerAdapter;
        let (previous, written) =
            adapter.atomic_update("k", &|_| Some(BreakerState::Isolated)).await.unwrap();
        assert_eq!(previous, None);
        assert_eq!(written, None);
        assert_eq!(adapter.find("k").await.unwrap(), None);
    }
}
