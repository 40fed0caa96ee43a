#![forbid(unsafe_code)]

//! # Lockstep
//!
//! Distributed coordination and resilience primitives for async Rust:
//! locks, readers–writer locks, counting semaphores, TTL caches, and
//! circuit breakers, all running over pluggable storage backends, plus the
//! retry/timeout/hedging middleware to call them with.
//!
//! ## Design
//!
//! - **Providers** are cheap facades minting per-key handles
//!   ([`Lock`], [`Semaphore`], [`CircuitBreaker`], …).
//! - **Adapters** are the backend contract per primitive. This crate ships
//!   in-memory adapters (real semantics, process-local) and `NoOp` adapters
//!   (the canonical mocks); relational backends implement the CRUD-grained
//!   `Database*Adapter` traits and get the full contract derived for them.
//! - **Expiration is logical**: every read treats `expiration <= now` as
//!   absent whether or not a sweeper has deleted the row.
//! - **Recoverable outcomes never throw**: contention is `false`, a miss is
//!   `None`; errors are reserved for infrastructure failures and
//!   misconfiguration.
//!
//! ## Quick start
//!
//! ```rust
//! use lockstep::{
//!     LockProvider, MemoryLockAdapter, Namespace, SystemClock, TimeSpan,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let clock = Arc::new(SystemClock);
//!     let adapter = Arc::new(MemoryLockAdapter::new(clock.clone()))
//!         as Arc<dyn lockstep::LockAdapter>;
//!     let locks = LockProvider::new(adapter, Namespace::new("app")?);
//!
//!     let lock = locks.create("jobs/nightly")?.ttl(TimeSpan::from_secs(30));
//!     if lock.acquire().await? {
//!         // ... do the work ...
//!         lock.release().await?;
//!     }
//!     Ok(())
//! }
//! ```

mod backoff;
mod cache;
mod cancel;
mod circuit_breaker;
mod clock;
mod codec;
mod error;
mod hooks;
mod lazy;
mod lock;
mod namespace;
mod registry;
mod resilience;
mod semaphore;
mod shared_lock;
mod time;

// Re-exports
pub use backoff::{Backoff, DEFAULT_JITTER, DEFAULT_MULTIPLIER};
pub use cache::{
    CacheAdapter, CacheBackend, CacheEntry, CacheError, CacheProvider, DatabaseCacheAdapter,
    DerivedCacheAdapter, MemoryCacheAdapter, MemoryDatabaseCacheAdapter, NoOpCacheAdapter,
};
pub use cancel::{abortable, AbortError, CancelToken};
pub use circuit_breaker::{
    BreakerAdapter, BreakerPolicy, BreakerState, BreakerStorage, BreakerStorageError,
    CircuitBreaker, CircuitBreakerError, CircuitBreakerProvider, ConsecutivePolicy, CountPolicy,
    MemoryBreakerAdapter, Metrics, NoOpBreakerAdapter, SampleBucket, SamplingPolicy, StateManager,
    StateUpdate, Transition,
};
pub use clock::{
    Clock, ManualClock, NoOpSleeper, RecordingSleeper, RuntimeSleeper, Sleeper, SystemClock,
};
pub use codec::{
    ErrorEnvelope, FlexibleSerializer, JsonSerializer, SerdeError, Serializer, SerializerExt,
    TimeSpanTransformer, Transformer,
};
pub use error::{ResilienceError, MAX_RETRY_FAILURES};
pub use hooks::{HookContext, Middleware, Next, Pipeline};
pub use lazy::Lazy;
pub use lock::{
    BlockingSettings, DatabaseLockAdapter, DerivedLockAdapter, Lock, LockAdapter, LockBackend,
    LockError, LockProvider, LockRecord, LockRefresh, MemoryDatabaseLockAdapter,
    MemoryLockAdapter, NoOpLockAdapter,
};
pub use namespace::{Key, Namespace, NamespaceError, DEFAULT_DELIMITER, ROOT_IDENTIFIER};
pub use registry::{AdapterRegistry, RegistryError};
pub use resilience::{Abortable, ConcurrencyLimit, Hedging, Retry, Timeout};
pub use semaphore::{
    MemorySemaphoreAdapter, NoOpSemaphoreAdapter, Semaphore, SemaphoreAdapter, SemaphoreError,
    SemaphoreProvider, SemaphoreRecord, SemaphoreState,
};
pub use shared_lock::{
    MemorySharedLockAdapter, NoOpSharedLockAdapter, Role, SharedLock, SharedLockAdapter,
    SharedLockError, SharedLockProvider, SharedLockState,
};
pub use time::{TimeSpan, Timestamp};

pub mod prelude;
