//! Circuit breaker over pluggable state storage.
//!
//! Three inner services drive the machine: a [`BreakerPolicy`] decides
//! transitions, [`BreakerStorage`] applies them atomically over a
//! [`BreakerAdapter`], and the [`StateManager`] dispatches by state tag.
//! The [`CircuitBreaker`] handle guards operations: OPEN and ISOLATED
//! short-circuit before the operation runs, every completed run is tracked.

mod adapter;
mod manager;
mod policy;
mod state;
mod storage;

pub use adapter::{
    BreakerAdapter, BreakerStorageError, MemoryBreakerAdapter, NoOpBreakerAdapter, StateUpdate,
};
pub use manager::StateManager;
pub use policy::{BreakerPolicy, ConsecutivePolicy, CountPolicy, SamplingPolicy};
pub use state::{BreakerState, Metrics, SampleBucket};
pub use storage::{BreakerStorage, Transition};

use crate::clock::{Clock, SystemClock};
use crate::namespace::{Namespace, NamespaceError};
use crate::time::TimeSpan;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; calls are rejected until the cooldown passes.
    #[error("circuit {key:?} is open, retry in {retry_in}")]
    Open { key: String, retry_in: TimeSpan },
    /// The circuit was manually isolated.
    #[error("circuit {key:?} is isolated")]
    Isolated { key: String },
    /// The guarded operation itself failed.
    #[error("{0}")]
    Inner(E),
    #[error(transparent)]
    Storage(#[from] BreakerStorageError),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self, Self::Isolated { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Facade minting [`CircuitBreaker`] handles that share one policy and one
/// state store.
#[derive(Clone)]
pub struct CircuitBreakerProvider {
    manager: Arc<StateManager>,
    namespace: Namespace,
}

impl CircuitBreakerProvider {
    pub fn new(
        adapter: Arc<dyn BreakerAdapter>,
        policy: Arc<dyn BreakerPolicy>,
        namespace: Namespace,
    ) -> Self {
        Self::with_clock(adapter, policy, namespace, Arc::new(SystemClock))
    }

    pub fn with_clock(
        adapter: Arc<dyn BreakerAdapter>,
        policy: Arc<dyn BreakerPolicy>,
        namespace: Namespace,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let storage = BreakerStorage::new(adapter, Arc::clone(&policy), clock);
        Self { manager: Arc::new(StateManager::new(storage, policy)), namespace }
    }

    pub fn group(&self) -> String {
        self.namespace.group()
    }

    pub fn with_group(&self, group: impl Into<String>) -> Result<Self, NamespaceError> {
        Ok(Self {
            manager: Arc::clone(&self.manager),
            namespace: self.namespace.with_group(group)?,
        })
    }

    /// Mint a handle guarding operations that fail with `E`.
    pub fn create<E>(&self, key: impl Into<String>) -> Result<CircuitBreaker<E>, NamespaceError> {
        let key = self.namespace.key(key)?;
        Ok(CircuitBreaker {
            manager: Arc::clone(&self.manager),
            key: key.to_string(),
            classifier: Arc::new(|_| true),
            _errors: PhantomData,
        })
    }
}

/// Per-key guard around fallible operations.
pub struct CircuitBreaker<E> {
    manager: Arc<StateManager>,
    key: String,
    classifier: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    _errors: PhantomData<fn(&E)>,
}

impl<E> Clone for CircuitBreaker<E> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            key: self.key.clone(),
            classifier: Arc::clone(&self.classifier),
            _errors: PhantomData,
        }
    }
}

impl<E> CircuitBreaker<E> {
    /// Choose which errors count as failures for state tracking; the rest
    /// pass through untracked. Default: every error counts.
    pub fn failure_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Run `op` under the breaker. OPEN and ISOLATED states reject before
    /// the operation starts; the outcome is tracked afterwards.
    pub async fn call<T, Fut>(
        &self,
        op: impl FnOnce() -> Fut,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let state = self.manager.update_state(&self.key).await?;
        match state {
            BreakerState::Open { .. } => {
                return Err(CircuitBreakerError::Open {
                    key: self.key.clone(),
                    retry_in: self.manager.retry_in(&state),
                });
            }
            BreakerState::Isolated => {
                return Err(CircuitBreakerError::Isolated { key: self.key.clone() });
            }
            BreakerState::Closed { .. } | BreakerState::HalfOpen { .. } => {}
        }

        match op().await {
            Ok(value) => {
                self.manager.track_success(&self.key).await?;
                Ok(value)
            }
            Err(error) => {
                if (self.classifier)(&error) {
                    self.manager.track_failure(&self.key).await?;
                }
                Err(CircuitBreakerError::Inner(error))
            }
        }
    }

    /// Current state, advancing time-driven transitions first.
    pub async fn state(&self) -> Result<BreakerState, BreakerStorageError> {
        self.manager.update_state(&self.key).await
    }

    /// Manually trip the circuit; sticky until [`CircuitBreaker::reset`].
    pub async fn isolate(&self) -> Result<(), BreakerStorageError> {
        self.manager.isolate(&self.key).await
    }

    pub async fn reset(&self) -> Result<(), BreakerStorageError> {
        self.manager.reset(&self.key).await
    }
}
