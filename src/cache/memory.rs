//! In-memory cache adapters.

use super::adapter::add_number;
use super::{CacheAdapter, CacheEntry, CacheError, DatabaseCacheAdapter};
use crate::clock::Clock;
use crate::time::{TimeSpan, Timestamp};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Process-local [`CacheAdapter`].
#[derive(Debug)]
pub struct MemoryCacheAdapter {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheAdapter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), clock }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CacheAdapter for MemoryCacheAdapter {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = self.clock.now();
        Ok(self
            .lock_entries()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn add(
        &self,
        key: &str,
        value: Value,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        let expiration = ttl.map(|ttl| now + ttl);
        entries.insert(key.to_string(), CacheEntry { value, expiration });
        Ok(true)
    }

    async fn put(
        &self,
        key: &str,
        value: Value,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let expiration = ttl.map(|ttl| now + ttl);
        let previous = entries.insert(key.to_string(), CacheEntry { value, expiration });
        Ok(previous.is_some_and(|entry| entry.is_live(now)))
    }

    async fn update(&self, key: &str, value: Value) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.value = value;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment(&self, key: &str, delta: f64) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => match add_number(&entry.value, delta) {
                Some(sum) => {
                    entry.value = sum;
                    Ok(true)
                }
                None => Err(CacheError::Type { key: key.to_string() }),
            },
            _ => Ok(false),
        }
    }

    async fn remove_many(&self, keys: &[String]) -> Result<bool, CacheError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let mut removed_live = false;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                removed_live |= entry.is_live(now);
            }
        }
        Ok(removed_live)
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.lock_entries().retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    async fn remove_expired(&self) -> Result<u64, CacheError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok((before - entries.len()) as u64)
    }
}

/// Process-local [`DatabaseCacheAdapter`], used to exercise the derived
/// adapter the way a SQL backend would be.
#[derive(Debug, Default)]
pub struct MemoryDatabaseCacheAdapter {
    rows: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryDatabaseCacheAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_rows(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DatabaseCacheAdapter for MemoryDatabaseCacheAdapter {
    async fn find(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.lock_rows().get(key).cloned())
    }

    async fn insert(&self, key: &str, entry: CacheEntry) -> Result<bool, CacheError> {
        let mut rows = self.lock_rows();
        if rows.contains_key(key) {
            return Ok(false);
        }
        rows.insert(key.to_string(), entry);
        Ok(true)
    }

    async fn upsert(&self, key: &str, entry: CacheEntry) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.lock_rows().insert(key.to_string(), entry))
    }

    async fn update_expired(
        &self,
        key: &str,
        entry: CacheEntry,
        now: Timestamp,
    ) -> Result<u64, CacheError> {
        let mut rows = self.lock_rows();
        match rows.get_mut(key) {
            Some(row) if !row.is_live(now) => {
                *row = entry;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn update_unexpired(
        &self,
        key: &str,
        value: Value,
        now: Timestamp,
    ) -> Result<u64, CacheError> {
        let mut rows = self.lock_rows();
        match rows.get_mut(key) {
            Some(row) if row.is_live(now) => {
                row.value = value;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn increment_unexpired(
        &self,
        key: &str,
        delta: f64,
        now: Timestamp,
    ) -> Result<u64, CacheError> {
        let mut rows = self.lock_rows();
        match rows.get_mut(key) {
            Some(row) if row.is_live(now) => match add_number(&row.value, delta) {
                Some(sum) => {
                    row.value = sum;
                    Ok(1)
                }
                None => Err(CacheError::Type { key: key.to_string() }),
            },
            _ => Ok(0),
        }
    }

    async fn remove_expired_many(&self, now: Timestamp) -> Result<u64, CacheError> {
        let mut rows = self.lock_rows();
        let before = rows.len();
        rows.retain(|_, row| row.is_live(now));
        Ok((before - rows.len()) as u64)
    }

    async fn remove_unexpired_many(
        &self,
        keys: &[String],
        now: Timestamp,
    ) -> Result<u64, CacheError> {
        let mut rows = self.lock_rows();
        let mut removed = 0;
        for key in keys {
            if let Some(row) = rows.remove(key) {
                if row.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn remove_all(&self) -> Result<(), CacheError> {
        self.lock_rows().clear();
        Ok(())
    }

    async fn remove_by_key_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.lock_rows().retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}
