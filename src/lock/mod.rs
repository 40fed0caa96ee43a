//! Distributed lock: mutually exclusive, owner-scoped, refreshable leases.
//!
//! A [`LockProvider`] mints per-key [`Lock`] handles. Each handle carries an
//! opaque owner string (a fresh UUIDv4 unless supplied) and an optional TTL;
//! only the matching owner can release or refresh, and an expired lease can
//! be reclaimed atomically by anyone.

mod adapter;
mod memory;

pub use adapter::{DatabaseLockAdapter, DerivedLockAdapter, LockAdapter, LockBackend, NoOpLockAdapter};
pub use memory::{MemoryDatabaseLockAdapter, MemoryLockAdapter};

use crate::backoff::Backoff;
use crate::clock::{Clock, RuntimeSleeper, Sleeper, SystemClock};
use crate::namespace::{Namespace, NamespaceError};
use crate::time::{TimeSpan, Timestamp};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("lock on {key:?} is already acquired")]
    KeyAlreadyAcquired { key: String },
    #[error("lock on {key:?} is not held by {owner:?}")]
    UnownedRelease { key: String, owner: String },
    #[error("lock on {key:?} cannot be refreshed by {owner:?}")]
    UnownedRefresh { key: String, owner: String },
    #[error("lock backend failed")]
    Unexpected(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl LockError {
    pub fn unexpected(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unexpected(Arc::new(cause))
    }
}

/// Persisted state of one lock key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub owner: String,
    /// `None` means the lease never expires.
    pub expiration: Option<Timestamp>,
}

impl LockRecord {
    /// Logical liveness: an expired record reads as absent.
    pub fn is_live(&self, now: Timestamp) -> bool {
        match self.expiration {
            Some(expiration) => expiration > now,
            None => true,
        }
    }
}

/// Outcome of a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRefresh {
    /// The caller owned the live lease; its expiration was extended.
    Refreshed,
    /// The lease is absent, expired, or held by someone else.
    Unowned,
    /// The lease exists but has no expiration to extend.
    Unexpirable,
}

/// Deadline and cadence for [`Lock::acquire_blocking`].
#[derive(Debug, Clone)]
pub struct BlockingSettings {
    pub time: TimeSpan,
    pub backoff: Backoff,
}

impl Default for BlockingSettings {
    fn default() -> Self {
        Self {
            time: TimeSpan::from_secs(30),
            backoff: Backoff::constant(TimeSpan::from_millis(100)),
        }
    }
}

/// Facade minting [`Lock`] handles over one adapter.
#[derive(Clone)]
pub struct LockProvider {
    adapter: Arc<dyn LockAdapter>,
    namespace: Namespace,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    default_ttl: Option<TimeSpan>,
}

impl LockProvider {
    pub fn new(backend: impl Into<LockBackend>, namespace: Namespace) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            adapter: backend.into().resolve(Arc::clone(&clock)),
            namespace,
            clock,
            sleeper: Arc::new(RuntimeSleeper),
            default_ttl: None,
        }
    }

    /// Share a clock between the provider and its adapter (tests).
    pub fn with_clock(backend: impl Into<LockBackend>, namespace: Namespace, clock: Arc<dyn Clock>) -> Self {
        Self {
            adapter: backend.into().resolve(Arc::clone(&clock)),
            namespace,
            clock,
            sleeper: Arc::new(RuntimeSleeper),
            default_ttl: None,
        }
    }

    /// TTL applied to handles that don't set their own.
    pub fn default_ttl(mut self, ttl: TimeSpan) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn group(&self) -> String {
        self.namespace.group()
    }

    /// Derive a provider whose keys live one group deeper.
    pub fn with_group(&self, group: impl Into<String>) -> Result<Self, NamespaceError> {
        let mut child = self.clone();
        child.namespace = self.namespace.with_group(group)?;
        Ok(child)
    }

    /// Mint a handle with a fresh UUIDv4 owner.
    pub fn create(&self, key: impl Into<String>) -> Result<Lock, NamespaceError> {
        self.create_owned(key, uuid::Uuid::new_v4().to_string())
    }

    /// Mint a handle with a caller-chosen owner string.
    pub fn create_owned(
        &self,
        key: impl Into<String>,
        owner: impl Into<String>,
    ) -> Result<Lock, NamespaceError> {
        let key = self.namespace.key(key)?;
        Ok(Lock {
            adapter: Arc::clone(&self.adapter),
            key: key.to_string(),
            owner: owner.into(),
            ttl: self.default_ttl,
            clock: Arc::clone(&self.clock),
            sleeper: Arc::clone(&self.sleeper),
        })
    }
}

/// Per-key lock handle. Cheap to clone; clones share owner and key.
#[derive(Clone)]
pub struct Lock {
    adapter: Arc<dyn LockAdapter>,
    key: String,
    owner: String,
    ttl: Option<TimeSpan>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl Lock {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Override the TTL for this handle; `None` (the default when the
    /// provider sets none) acquires unexpirable leases.
    pub fn ttl(mut self, ttl: TimeSpan) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Try to take the lease. `false` means a live lease is held elsewhere.
    pub async fn acquire(&self) -> Result<bool, LockError> {
        let acquired = self.adapter.acquire(&self.key, &self.owner, self.ttl).await?;
        if acquired {
            tracing::debug!(key = %self.key, owner = %self.owner, "lock acquired");
        }
        Ok(acquired)
    }

    pub async fn acquire_or_fail(&self) -> Result<(), LockError> {
        if self.acquire().await? {
            Ok(())
        } else {
            Err(LockError::KeyAlreadyAcquired { key: self.key.clone() })
        }
    }

    /// Retry acquisition per the backoff until it succeeds or the deadline
    /// passes, then fail with `KeyAlreadyAcquired`.
    pub async fn acquire_blocking(&self, settings: BlockingSettings) -> Result<(), LockError> {
        let deadline = self.clock.now() + settings.time;
        let mut attempt = 0u32;
        loop {
            if self.acquire().await? {
                return Ok(());
            }
            attempt += 1;
            if self.clock.now() >= deadline {
                return Err(LockError::KeyAlreadyAcquired { key: self.key.clone() });
            }
            let delay = settings.backoff.delay(attempt, None);
            self.sleeper.sleep(delay).await;
        }
    }

    /// Give the lease back. `false` when the caller does not hold a live
    /// lease (including its own lease having expired).
    pub async fn release(&self) -> Result<bool, LockError> {
        let released = self.adapter.release(&self.key, &self.owner).await?;
        if released {
            tracing::debug!(key = %self.key, owner = %self.owner, "lock released");
        }
        Ok(released)
    }

    pub async fn release_or_fail(&self) -> Result<(), LockError> {
        if self.release().await? {
            Ok(())
        } else {
            Err(LockError::UnownedRelease { key: self.key.clone(), owner: self.owner.clone() })
        }
    }

    /// Drop the lease regardless of owner.
    pub async fn force_release(&self) -> Result<(), LockError> {
        tracing::warn!(key = %self.key, "lock force-released");
        self.adapter.force_release(&self.key).await
    }

    /// Extend the lease to `now + ttl` if this handle owns it.
    pub async fn refresh(&self, ttl: TimeSpan) -> Result<LockRefresh, LockError> {
        self.adapter.refresh(&self.key, &self.owner, ttl).await
    }

    pub async fn refresh_or_fail(&self, ttl: TimeSpan) -> Result<(), LockError> {
        match self.refresh(ttl).await? {
            LockRefresh::Refreshed | LockRefresh::Unexpirable => Ok(()),
            LockRefresh::Unowned => {
                Err(LockError::UnownedRefresh { key: self.key.clone(), owner: self.owner.clone() })
            }
        }
    }

    /// The live record, if any. Expired leases read as `None`.
    pub async fn get_state(&self) -> Result<Option<LockRecord>, LockError> {
        self.adapter.find(&self.key).await
    }

    pub async fn is_locked(&self) -> Result<bool, LockError> {
        Ok(self.get_state().await?.is_some())
    }

    /// Run `work` under the lock, releasing afterwards. `None` when the
    /// lease could not be taken.
    pub async fn run<T, Fut>(&self, work: impl FnOnce() -> Fut) -> Result<Option<T>, LockError>
    where
        Fut: Future<Output = T>,
    {
        if !self.acquire().await? {
            return Ok(None);
        }
        let out = work().await;
        self.release().await?;
        Ok(Some(out))
    }

    /// Like [`Lock::run`] but waits for the lease per `settings`.
    pub async fn run_blocking<T, Fut>(
        &self,
        settings: BlockingSettings,
        work: impl FnOnce() -> Fut,
    ) -> Result<T, LockError>
    where
        Fut: Future<Output = T>,
    {
        self.acquire_blocking(settings).await?;
        let out = work().await;
        self.release().await?;
        Ok(out)
    }
}
