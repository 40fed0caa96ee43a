//! Lock adapter contracts.
//!
//! Backends either implement [`LockAdapter`] directly (key-value stores
//! with conditional writes) or the finer-grained [`DatabaseLockAdapter`]
//! (relational/document stores), from which [`DerivedLockAdapter`] rebuilds
//! the full contract. [`LockBackend`] is the sum the provider accepts.

use super::{LockError, LockRecord, LockRefresh};
use crate::clock::Clock;
use crate::time::{TimeSpan, Timestamp};
use async_trait::async_trait;
use std::sync::Arc;

/// Full lock contract, mirroring the provider one-to-one.
///
/// `acquire` must be atomic with respect to concurrent acquires of the same
/// key, including the expired-reclaim path.
#[async_trait]
pub trait LockAdapter: Send + Sync {
    async fn acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, LockError>;

    /// `true` iff `owner` held a live lease that is now gone.
    async fn release(&self, key: &str, owner: &str) -> Result<bool, LockError>;

    async fn force_release(&self, key: &str) -> Result<(), LockError>;

    async fn refresh(
        &self,
        key: &str,
        owner: &str,
        ttl: TimeSpan,
    ) -> Result<LockRefresh, LockError>;

    /// The live record; expired rows read as `None`.
    async fn find(&self, key: &str) -> Result<Option<LockRecord>, LockError>;
}

/// CRUD surface a relational/document backend exposes instead of
/// [`LockAdapter`]. Expirations are absolute; `now` is supplied by the
/// caller so the backend stays clock-free.
#[async_trait]
pub trait DatabaseLockAdapter: Send + Sync {
    /// Insert a fresh row; `false` on a key collision.
    async fn insert(
        &self,
        key: &str,
        owner: &str,
        expiration: Option<Timestamp>,
    ) -> Result<bool, LockError>;

    /// Take over a row whose expiration is `≤ now`; returns updated-row count.
    async fn update_if_expired(
        &self,
        key: &str,
        owner: &str,
        expiration: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<u64, LockError>;

    /// Remove the row if `owner` matches, returning the removed row.
    async fn remove_if_owner(&self, key: &str, owner: &str)
        -> Result<Option<LockRecord>, LockError>;

    async fn remove(&self, key: &str) -> Result<(), LockError>;

    /// Extend a live owned row; returns updated-row count.
    async fn update_expiration_if_owner(
        &self,
        key: &str,
        owner: &str,
        expiration: Timestamp,
        now: Timestamp,
    ) -> Result<u64, LockError>;

    async fn find(&self, key: &str) -> Result<Option<LockRecord>, LockError>;
}

/// [`LockAdapter`] reconstructed from a [`DatabaseLockAdapter`].
///
/// Acquisition is insert-first: on a collision the expired-holder takeover
/// runs as a conditional update, which the backend executes atomically.
pub struct DerivedLockAdapter {
    database: Arc<dyn DatabaseLockAdapter>,
    clock: Arc<dyn Clock>,
}

impl DerivedLockAdapter {
    pub fn new(database: Arc<dyn DatabaseLockAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self { database, clock }
    }
}

#[async_trait]
impl LockAdapter for DerivedLockAdapter {
    async fn acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, LockError> {
        let now = self.clock.now();
        let expiration = ttl.map(|ttl| now + ttl);
        if self.database.insert(key, owner, expiration).await? {
            return Ok(true);
        }
        let reclaimed = self.database.update_if_expired(key, owner, expiration, now).await?;
        Ok(reclaimed > 0)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool, LockError> {
        let now = self.clock.now();
        match self.database.remove_if_owner(key, owner).await? {
            Some(record) => Ok(record.is_live(now)),
            None => Ok(false),
        }
    }

    async fn force_release(&self, key: &str) -> Result<(), LockError> {
        self.database.remove(key).await
    }

    async fn refresh(
        &self,
        key: &str,
        owner: &str,
        ttl: TimeSpan,
    ) -> Result<LockRefresh, LockError> {
        let now = self.clock.now();
        let record = match self.database.find(key).await? {
            Some(record) => record,
            None => return Ok(LockRefresh::Unowned),
        };
        if record.owner != owner || !record.is_live(now) {
            return Ok(LockRefresh::Unowned);
        }
        if record.expiration.is_none() {
            return Ok(LockRefresh::Unexpirable);
        }
        let updated =
            self.database.update_expiration_if_owner(key, owner, now + ttl, now).await?;
        if updated > 0 {
            Ok(LockRefresh::Refreshed)
        } else {
            Ok(LockRefresh::Unowned)
        }
    }

    async fn find(&self, key: &str) -> Result<Option<LockRecord>, LockError> {
        let now = self.clock.now();
        Ok(self.database.find(key).await?.filter(|record| record.is_live(now)))
    }
}

/// Backend sum accepted by the provider.
pub enum LockBackend {
    Adapter(Arc<dyn LockAdapter>),
    Database(Arc<dyn DatabaseLockAdapter>),
}

impl LockBackend {
    /// Normalize to the full contract, wrapping database backends in the
    /// derivation.
    pub fn resolve(self, clock: Arc<dyn Clock>) -> Arc<dyn LockAdapter> {
        match self {
            Self::Adapter(adapter) => adapter,
            Self::Database(database) => Arc::new(DerivedLockAdapter::new(database, clock)),
        }
    }
}

impl From<Arc<dyn LockAdapter>> for LockBackend {
    fn from(adapter: Arc<dyn LockAdapter>) -> Self {
        Self::Adapter(adapter)
    }
}

impl From<Arc<dyn DatabaseLockAdapter>> for LockBackend {
    fn from(database: Arc<dyn DatabaseLockAdapter>) -> Self {
        Self::Database(database)
    }
}

/// Backend-free adapter: every acquisition succeeds, nothing is stored.
/// The canonical mock for wiring tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpLockAdapter;

#[async_trait]
impl LockAdapter for NoOpLockAdapter {
    async fn acquire(
        &self,
        _key: &str,
        _owner: &str,
        _ttl: Option<TimeSpan>,
    ) -> Result<bool, LockError> {
        Ok(true)
    }

    async fn release(&self, _key: &str, _owner: &str) -> Result<bool, LockError> {
        Ok(true)
    }

    async fn force_release(&self, _key: &str) -> Result<(), LockError> {
        Ok(())
    }

    async fn refresh(
        &self,
        _key: &str,
        _owner: &str,
        _ttl: TimeSpan,
    ) -> Result<LockRefresh, LockError> {
        Ok(LockRefresh::Refreshed)
    }

    async fn find(&self, _key: &str) -> Result<Option<LockRecord>, LockError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::super::MemoryDatabaseLockAdapter;
    use super::*;
    use crate::clock::ManualClock;

    fn derived(clock: &ManualClock) -> DerivedLockAdapter {
        let database = MemoryDatabaseLockAdapter::new();
        DerivedLockAdapter::new(Arc::new(database), Arc::new(clock.clone()))
    }

    fn manual() -> ManualClock {
        ManualClock::new(Timestamp::from_unix_millis(1_000))
    }

    #[tokio::test]
    async fn insert_then_update_if_expired_reclaims() {
        let clock = manual();
        let adapter = derived(&clock);

        assert!(adapter.acquire("k", "a", Some(TimeSpan::from_millis(100))).await.unwrap());
        assert!(!adapter.acquire("k", "b", None).await.unwrap(), "live lease blocks insert");

        clock.advance_millis(150);
        assert!(adapter.acquire("k", "b", None).await.unwrap(), "expired row is taken over");
        assert_eq!(adapter.find("k").await.unwrap().unwrap().owner, "b");
    }

    #[tokio::test]
    async fn release_checks_liveness_of_the_removed_row() {
        let clock = manual();
        let adapter = derived(&clock);

        assert!(adapter.acquire("k", "a", Some(TimeSpan::from_millis(100))).await.unwrap());
        clock.advance_millis(150);
        assert!(!adapter.release("k", "a").await.unwrap(), "expired row releases as false");

        assert!(adapter.acquire("k", "a", Some(TimeSpan::from_secs(1))).await.unwrap());
        assert!(adapter.release("k", "a").await.unwrap());
    }

    #[tokio::test]
    async fn derived_refresh_distinguishes_unowned_and_unexpirable() {
        let clock = manual();
        let adapter = derived(&clock);

        assert_eq!(
            adapter.refresh("k", "a", TimeSpan::from_secs(1)).await.unwrap(),
            LockRefresh::Unowned
        );

        assert!(adapter.acquire("k", "a", None).await.unwrap());
        assert_eq!(
            adapter.refresh("k", "a", TimeSpan::from_secs(1)).await.unwrap(),
            LockRefresh::Unexpirable
        );

        adapter.force_release("k").await.unwrap();
        assert!(adapter.acquire("k", "a", Some(TimeSpan::from_secs(1))).await.unwrap());
        assert_eq!(
            adapter.refresh("k", "b", TimeSpan::from_secs(1)).await.unwrap(),
            LockRefresh::Unowned
        );
        assert_eq!(
            adapter.refresh("k", "a", TimeSpan::from_secs(1)).await.unwrap(),
            LockRefresh::Refreshed
        );
    }

    #[tokio::test]
    async fn find_filters_expired_rows() {
        let clock = manual();
        let adapter = derived(&clock);

        assert!(adapter.acquire("k", "a", Some(TimeSpan::from_millis(50))).await.unwrap());
        assert!(adapter.find("k").await.unwrap().is_some());
        clock.advance_millis(60);
        assert!(adapter.find("k").await.unwrap().is_none(), "expired row reads as absent");
    }

    #[tokio::test]
    async fn noop_adapter_gives_constant_answers() {
        let adapter = NoOpLockAdapter;
        assert!(adapter.acquire("k", "a", None).await.unwrap());
        assert!(adapter.release("k", "a").await.unwrap());
        assert_eq!(
            adapter.refresh("k", "a", TimeSpan::from_secs(1)).await.unwrap(),
            LockRefresh::Refreshed
        );
        assert!(adapter.find("k").await.unwrap().is_none());
    }
}
