//! Counting semaphore: a fixed number of TTL'd slots per key.
//!
//! Each [`Semaphore`] handle owns a distinct slot id. Acquisition creates
//! the key with its limit on first use; the limit is immutable afterwards
//! and contradicting it fails with [`SemaphoreError::LimitMismatch`]. The
//! adapter performs the find-count-insert sequence atomically.

mod adapter;
mod memory;

pub use adapter::{NoOpSemaphoreAdapter, SemaphoreAdapter};
pub use memory::MemorySemaphoreAdapter;

use crate::backoff::Backoff;
use crate::clock::{Clock, RuntimeSleeper, Sleeper, SystemClock};
use crate::namespace::{Namespace, NamespaceError};
use crate::time::{TimeSpan, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SemaphoreError {
    #[error("semaphore {key:?} exists with limit {stored}, not {requested}")]
    LimitMismatch { key: String, stored: u32, requested: u32 },
    #[error("semaphore {key:?} has all {limit} slots occupied")]
    LimitReached { key: String, limit: u32 },
    #[error("semaphore backend failed")]
    Unexpected(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl SemaphoreError {
    pub fn unexpected(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unexpected(Arc::new(cause))
    }
}

/// Persisted state of one semaphore key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemaphoreRecord {
    pub limit: u32,
    /// Slot id → expiration (`None` = unexpirable). May contain expired
    /// slots; they read as absent.
    pub slots: HashMap<String, Option<Timestamp>>,
}

impl SemaphoreRecord {
    pub fn live_slots(&self, now: Timestamp) -> usize {
        self.slots.values().filter(|expiration| is_live(**expiration, now)).count()
    }
}

pub(crate) fn is_live(expiration: Option<Timestamp>, now: Timestamp) -> bool {
    match expiration {
        Some(expiration) => expiration > now,
        None => true,
    }
}

/// Handle-relative view derived from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreState {
    /// This handle holds no slot and capacity remains.
    Unacquired,
    /// This handle holds a live slot.
    Acquired,
    /// This handle's slot exists but has expired.
    Expired,
    /// This handle holds no slot and every slot is taken.
    LimitReached,
}

/// Facade minting [`Semaphore`] handles over one adapter.
#[derive(Clone)]
pub struct SemaphoreProvider {
    adapter: Arc<dyn SemaphoreAdapter>,
    namespace: Namespace,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    default_ttl: Option<TimeSpan>,
}

impl SemaphoreProvider {
    pub fn new(adapter: Arc<dyn SemaphoreAdapter>, namespace: Namespace) -> Self {
        Self {
            adapter,
            namespace,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(RuntimeSleeper),
            default_ttl: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn default_ttl(mut self, ttl: TimeSpan) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn group(&self) -> String {
        self.namespace.group()
    }

    pub fn with_group(&self, group: impl Into<String>) -> Result<Self, NamespaceError> {
        let mut child = self.clone();
        child.namespace = self.namespace.with_group(group)?;
        Ok(child)
    }

    /// Mint a handle with a fresh slot id.
    pub fn create(&self, key: impl Into<String>, limit: u32) -> Result<Semaphore, NamespaceError> {
        let key = self.namespace.key(key)?;
        Ok(Semaphore {
            adapter: Arc::clone(&self.adapter),
            key: key.to_string(),
            slot_id: uuid::Uuid::new_v4().to_string(),
            limit: limit.max(1),
            ttl: self.default_ttl,
            clock: Arc::clone(&self.clock),
            sleeper: Arc::clone(&self.sleeper),
        })
    }
}

/// Per-key semaphore handle owning one slot id.
#[derive(Clone)]
pub struct Semaphore {
    adapter: Arc<dyn SemaphoreAdapter>,
    key: String,
    slot_id: String,
    limit: u32,
    ttl: Option<TimeSpan>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl Semaphore {
    pub fn slot_id(&self) -> &str {
        &self.slot_id
    }

    pub fn ttl(mut self, ttl: TimeSpan) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Take a slot. `false` when every slot is occupied; an existing key
    /// with a different limit fails with `LimitMismatch`.
    pub async fn acquire(&self) -> Result<bool, SemaphoreError> {
        let acquired =
            self.adapter.acquire(&self.key, &self.slot_id, self.limit, self.ttl).await?;
        if acquired {
            tracing::debug!(key = %self.key, slot = %self.slot_id, "semaphore slot acquired");
        }
        Ok(acquired)
    }

    pub async fn acquire_or_fail(&self) -> Result<(), SemaphoreError> {
        if self.acquire().await? {
            Ok(())
        } else {
            Err(SemaphoreError::LimitReached { key: self.key.clone(), limit: self.limit })
        }
    }

    /// Retry acquisition per the backoff until a slot frees up or the
    /// deadline passes.
    pub async fn acquire_blocking(
        &self,
        time: TimeSpan,
        backoff: Backoff,
    ) -> Result<(), SemaphoreError> {
        let deadline = self.clock.now() + time;
        let mut attempt = 0u32;
        loop {
            if self.acquire().await? {
                return Ok(());
            }
            attempt += 1;
            if self.clock.now() >= deadline {
                return Err(SemaphoreError::LimitReached { key: self.key.clone(), limit: self.limit });
            }
            let delay = backoff.delay(attempt, None);
            self.sleeper.sleep(delay).await;
        }
    }

    /// Give this handle's slot back. Releasing the last slot removes the
    /// record (and its limit) entirely.
    pub async fn release(&self) -> Result<bool, SemaphoreError> {
        let released = self.adapter.release(&self.key, &self.slot_id).await?;
        if released {
            tracing::debug!(key = %self.key, slot = %self.slot_id, "semaphore slot released");
        }
        Ok(released)
    }

    /// Extend this slot's expiration to `now + ttl`; other slots are
    /// untouched. `false` when the slot is absent or expired.
    pub async fn refresh(&self, ttl: TimeSpan) -> Result<bool, SemaphoreError> {
        self.adapter.refresh(&self.key, &self.slot_id, ttl).await
    }

    /// Drop every slot on the key regardless of owner.
    pub async fn force_release_all(&self) -> Result<(), SemaphoreError> {
        tracing::warn!(key = %self.key, "semaphore force-released");
        self.adapter.force_release_all(&self.key).await
    }

    /// The raw record, expired slots included.
    pub async fn get_record(&self) -> Result<Option<SemaphoreRecord>, SemaphoreError> {
        self.adapter.get_state(&self.key).await
    }

    /// This handle's view of the key.
    pub async fn get_state(&self) -> Result<SemaphoreState, SemaphoreError> {
        let now = self.clock.now();
        let Some(record) = self.get_record().await? else {
            return Ok(SemaphoreState::Unacquired);
        };
        match record.slots.get(&self.slot_id) {
            Some(expiration) if is_live(*expiration, now) => Ok(SemaphoreState::Acquired),
            Some(_) => Ok(SemaphoreState::Expired),
            None if record.live_slots(now) >= record.limit as usize => {
                Ok(SemaphoreState::LimitReached)
            }
            None => Ok(SemaphoreState::Unacquired),
        }
    }
}
