//! Convenient re-exports for common Lockstep types.
pub use crate::{
    backoff::Backoff,
    cache::{CacheError, CacheProvider, MemoryCacheAdapter, NoOpCacheAdapter},
    cancel::{abortable, AbortError, CancelToken},
    circuit_breaker::{
        BreakerState, CircuitBreaker, CircuitBreakerError, CircuitBreakerProvider,
        ConsecutivePolicy, CountPolicy, MemoryBreakerAdapter, SamplingPolicy,
    },
    clock::{
        Clock, ManualClock, NoOpSleeper, RecordingSleeper, RuntimeSleeper, Sleeper, SystemClock,
    },
    error::ResilienceError,
    hooks::Pipeline,
    lazy::Lazy,
    lock::{
        BlockingSettings, Lock, LockError, LockProvider, LockRefresh, MemoryLockAdapter,
        NoOpLockAdapter,
    },
    namespace::Namespace,
    resilience::{Abortable, ConcurrencyLimit, Hedging, Retry, Timeout},
    semaphore::{MemorySemaphoreAdapter, Semaphore, SemaphoreError, SemaphoreProvider, SemaphoreState},
    shared_lock::{MemorySharedLockAdapter, SharedLock, SharedLockError, SharedLockProvider},
    time::{TimeSpan, Timestamp},
};
