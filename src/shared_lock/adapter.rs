//! Shared lock adapter contract.

use super::{SharedLockError, SharedLockState};
use crate::lock::LockRefresh;
use crate::time::TimeSpan;
use async_trait::async_trait;

/// Backend contract for the readers–writer lock.
///
/// Every operation must uphold the exclusion invariant under concurrent
/// callers: a live writer implies no live readers and vice versa. Expired
/// leases read as absent at this boundary.
#[async_trait]
pub trait SharedLockAdapter: Send + Sync {
    async fn acquire_writer(
        &self,
        key: &str,
        owner: &str,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, SharedLockError>;

    async fn acquire_reader(
        &self,
        key: &str,
        owner: &str,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, SharedLockError>;

    async fn release_writer(&self, key: &str, owner: &str) -> Result<bool, SharedLockError>;

    async fn release_reader(&self, key: &str, owner: &str) -> Result<bool, SharedLockError>;

    async fn refresh_writer(
        &self,
        key: &str,
        owner: &str,
        ttl: TimeSpan,
    ) -> Result<LockRefresh, SharedLockError>;

    async fn refresh_reader(
        &self,
        key: &str,
        owner: &str,
        ttl: TimeSpan,
    ) -> Result<LockRefresh, SharedLockError>;

    async fn force_release(&self, key: &str) -> Result<(), SharedLockError>;

    async fn get_state(&self, key: &str) -> Result<SharedLockState, SharedLockError>;
}

/// Backend-free adapter: acquisitions succeed, state is always free.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSharedLockAdapter;

#[async_trait]
impl SharedLockAdapter for NoOpSharedLockAdapter {
    async fn acquire_writer(
        &self,
        _key: &str,
        _owner: &str,
        _ttl: Option<TimeSpan>,
    ) -> Result<bool, SharedLockError> {
        Ok(true)
    }

    async fn acquire_reader(
        &self,
        _key: &str,
        _owner: &str,
        _ttl: Option<TimeSpan>,
    ) -> Result<bool, SharedLockError> {
        Ok(true)
    }

    async fn release_writer(&self, _key: &str, _owner: &str) -> Result<bool, SharedLockError> {
        Ok(true)
    }

    async fn release_reader(&self, _key: &str, _owner: &str) -> Result<bool, SharedLockError> {
        Ok(true)
    }

    async fn refresh_writer(
        &self,
        _key: &str,
        _owner: &str,
        _ttl: TimeSpan,
    ) -> Result<LockRefresh, SharedLockError> {
        Ok(LockRefresh::Refreshed)
    }

    async fn refresh_reader(
        &self,
        _key: &str,
        _owner: &str,
        _ttl: TimeSpan,
    ) -> Result<LockRefresh, SharedLockError> {
        Ok(LockRefresh::Refreshed)
    }

    async fn force_release(&self, _key: &str) -> Result<(), SharedLockError> {
        Ok(())
    }

    async fn get_state(&self, _key: &str) -> Result<SharedLockState, SharedLockError> {
        Ok(SharedLockState::default())
    }
}
