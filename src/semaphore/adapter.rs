//! Semaphore adapter contract.

use super::{SemaphoreError, SemaphoreRecord};
use crate::time::TimeSpan;
use async_trait::async_trait;

/// Backend contract for the counting semaphore.
///
/// `acquire` must run its find-count-insert sequence atomically (one mutex
/// section, transaction, or server-side script) so the slot bound holds
/// under concurrent callers.
#[async_trait]
pub trait SemaphoreAdapter: Send + Sync {
    /// Take `slot_id` on `key`. Creates the key with `limit` on first use;
    /// an existing key with a different limit fails with `LimitMismatch`.
    /// `false` when all slots are occupied.
    async fn acquire(
        &self,
        key: &str,
        slot_id: &str,
        limit: u32,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, SemaphoreError>;

    /// Remove `slot_id`; removing the last slot drops the record. `false`
    /// when the slot is absent or expired.
    async fn release(&self, key: &str, slot_id: &str) -> Result<bool, SemaphoreError>;

    /// Extend only `slot_id`'s expiration. `false` when absent or expired.
    async fn refresh(&self, key: &str, slot_id: &str, ttl: TimeSpan)
        -> Result<bool, SemaphoreError>;

    async fn force_release_all(&self, key: &str) -> Result<(), SemaphoreError>;

    /// The raw record, expired slots included (callers derive liveness).
    async fn get_state(&self, key: &str) -> Result<Option<SemaphoreRecord>, SemaphoreError>;
}

/// Backend-free adapter: every acquisition succeeds, nothing is tracked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSemaphoreAdapter;

#[async_trait]
impl SemaphoreAdapter for NoOpSemaphoreAdapter {
    async fn acquire(
        &self,
        _key: &str,
        _slot_id: &str,
        _limit: u32,
        _ttl: Option<TimeSpan>,
    ) -> Result<bool, SemaphoreError> {
        Ok(true)
    }

    async fn release(&self, _key: &str, _slot_id: &str) -> Result<bool, SemaphoreError> {
        Ok(true)
    }

    async fn refresh(
        &self,
        _key: &str,
        _slot_id: &str,
        _ttl: TimeSpan,
    ) -> Result<bool, SemaphoreError> {
        Ok(true)
    }

    async fn force_release_all(&self, _key: &str) -> Result<(), SemaphoreError> {
        Ok(())
    }

    async fn get_state(&self, _key: &str) -> Result<Option<SemaphoreRecord>, SemaphoreError> {
        Ok(None)
    }
}
