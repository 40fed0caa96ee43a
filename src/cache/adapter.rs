//! Cache adapter contracts.
//!
//! Key-value backends implement [`CacheAdapter`] directly; relational and
//! document backends implement the CRUD-grained [`DatabaseCacheAdapter`]
//! and are wrapped by [`DerivedCacheAdapter`]. [`CacheBackend`] is the sum
//! the provider accepts.

use super::CacheError;
use crate::clock::Clock;
use crate::time::{TimeSpan, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Persisted cache row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    pub expiration: Option<Timestamp>,
}

impl CacheEntry {
    pub fn is_live(&self, now: Timestamp) -> bool {
        match self.expiration {
            Some(expiration) => expiration > now,
            None => true,
        }
    }
}

/// Full cache contract; reads filter expiration at this boundary.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Insert only if no live entry exists; `true` iff inserted.
    async fn add(&self, key: &str, value: Value, ttl: Option<TimeSpan>)
        -> Result<bool, CacheError>;

    /// Upsert; `true` iff a live entry was replaced.
    async fn put(&self, key: &str, value: Value, ttl: Option<TimeSpan>)
        -> Result<bool, CacheError>;

    /// Replace a live entry, keeping its expiration; `true` iff replaced.
    async fn update(&self, key: &str, value: Value) -> Result<bool, CacheError>;

    /// Numeric add on a live entry; `CacheError::Type` for non-numbers.
    async fn increment(&self, key: &str, delta: f64) -> Result<bool, CacheError>;

    /// `true` iff at least one live entry was removed.
    async fn remove_many(&self, keys: &[String]) -> Result<bool, CacheError>;

    async fn remove_by_prefix(&self, prefix: &str) -> Result<(), CacheError>;

    /// Physically delete expired rows; returns how many went. Purely an
    /// optimization hook for the sweeper.
    async fn remove_expired(&self) -> Result<u64, CacheError>;
}

/// CRUD surface a relational/document backend exposes instead of
/// [`CacheAdapter`]. Rows are raw: expired entries stay visible here and
/// liveness is decided against the `now` argument.
#[async_trait]
pub trait DatabaseCacheAdapter: Send + Sync {
    async fn find(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert a fresh row; `false` on a key collision.
    async fn insert(&self, key: &str, entry: CacheEntry) -> Result<bool, CacheError>;

    /// Unconditional upsert returning the previous row.
    async fn upsert(&self, key: &str, entry: CacheEntry)
        -> Result<Option<CacheEntry>, CacheError>;

    /// Overwrite a row whose expiration is `≤ now`; returns updated count.
    async fn update_expired(
        &self,
        key: &str,
        entry: CacheEntry,
        now: Timestamp,
    ) -> Result<u64, CacheError>;

    /// Replace the value of a live row, keeping its expiration.
    async fn update_unexpired(
        &self,
        key: &str,
        value: Value,
        now: Timestamp,
    ) -> Result<u64, CacheError>;

    /// Numeric add on a live row; `CacheError::Type` for non-numbers.
    async fn increment_unexpired(
        &self,
        key: &str,
        delta: f64,
        now: Timestamp,
    ) -> Result<u64, CacheError>;

    async fn remove_expired_many(&self, now: Timestamp) -> Result<u64, CacheError>;

    /// Remove live rows among `keys`; returns removed count.
    async fn remove_unexpired_many(
        &self,
        keys: &[String],
        now: Timestamp,
    ) -> Result<u64, CacheError>;

    async fn remove_all(&self) -> Result<(), CacheError>;

    async fn remove_by_key_prefix(&self, prefix: &str) -> Result<(), CacheError>;
}

/// [`CacheAdapter`] reconstructed from a [`DatabaseCacheAdapter`].
pub struct DerivedCacheAdapter {
    database: Arc<dyn DatabaseCacheAdapter>,
    clock: Arc<dyn Clock>,
}

impl DerivedCacheAdapter {
    pub fn new(database: Arc<dyn DatabaseCacheAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self { database, clock }
    }

    fn entry(&self, value: Value, ttl: Option<TimeSpan>) -> CacheEntry {
        CacheEntry { value, expiration: ttl.map(|ttl| self.clock.now() + ttl) }
    }
}

#[async_trait]
impl CacheAdapter for DerivedCacheAdapter {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = self.clock.now();
        Ok(self
            .database
            .find(key)
            .await?
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn add(
        &self,
        key: &str,
        value: Value,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, CacheError> {
        let entry = self.entry(value, ttl);
        if self.database.insert(key, entry.clone()).await? {
            return Ok(true);
        }
        // Collision: the row may still be expired and therefore replaceable.
        let replaced = self.database.update_expired(key, entry, self.clock.now()).await?;
        Ok(replaced > 0)
    }

    async fn put(
        &self,
        key: &str,
        value: Value,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let previous = self.database.upsert(key, self.entry(value, ttl)).await?;
        Ok(previous.is_some_and(|entry| entry.is_live(now)))
    }

    async fn update(&self, key: &str, value: Value) -> Result<bool, CacheError> {
        let updated = self.database.update_unexpired(key, value, self.clock.now()).await?;
        Ok(updated > 0)
    }

    async fn increment(&self, key: &str, delta: f64) -> Result<bool, CacheError> {
        let updated = self.database.increment_unexpired(key, delta, self.clock.now()).await?;
        Ok(updated > 0)
    }

    async fn remove_many(&self, keys: &[String]) -> Result<bool, CacheError> {
        let removed = self.database.remove_unexpired_many(keys, self.clock.now()).await?;
        Ok(removed > 0)
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.database.remove_by_key_prefix(prefix).await
    }

    async fn remove_expired(&self) -> Result<u64, CacheError> {
        self.database.remove_expired_many(self.clock.now()).await
    }
}

/// Backend sum accepted by the provider.
pub enum CacheBackend {
    Adapter(Arc<dyn CacheAdapter>),
    Database(Arc<dyn DatabaseCacheAdapter>),
}

impl CacheBackend {
    pub fn resolve(self, clock: Arc<dyn Clock>) -> Arc<dyn CacheAdapter> {
        match self {
            Self::Adapter(adapter) => adapter,
            Self::Database(database) => Arc::new(DerivedCacheAdapter::new(database, clock)),
        }
    }
}

impl From<Arc<dyn CacheAdapter>> for CacheBackend {
    fn from(adapter: Arc<dyn CacheAdapter>) -> Self {
        Self::Adapter(adapter)
    }
}

impl From<Arc<dyn DatabaseCacheAdapter>> for CacheBackend {
    fn from(database: Arc<dyn DatabaseCacheAdapter>) -> Self {
        Self::Database(database)
    }
}

/// Backend-free adapter: reads miss, writes succeed, nothing is stored.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCacheAdapter;

#[async_trait]
impl CacheAdapter for NoOpCacheAdapter {
    async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
        Ok(None)
    }

    async fn add(
        &self,
        _key: &str,
        _value: Value,
        _ttl: Option<TimeSpan>,
    ) -> Result<bool, CacheError> {
        Ok(true)
    }

    async fn put(
        &self,
        _key: &str,
        _value: Value,
        _ttl: Option<TimeSpan>,
    ) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn update(&self, _key: &str, _value: Value) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn increment(&self, _key: &str, _delta: f64) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn remove_many(&self, _keys: &[String]) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn remove_by_prefix(&self, _prefix: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn remove_expired(&self) -> Result<u64, CacheError> {
        Ok(0)
    }
}

/// Numeric add preserving integer representation where possible.
pub(crate) fn add_number(current: &Value, delta: f64) -> Option<Value> {
    let current = current.as_number()?;
    if let Some(int) = current.as_i64() {
        if delta.fract() == 0.0 {
            return Some(Value::from(int.saturating_add(delta as i64)));
        }
    }
    let sum = current.as_f64()? + delta;
    serde_json::Number::from_f64(sum).map(Value::Number)
}
