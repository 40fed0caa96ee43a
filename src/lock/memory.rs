//! In-memory lock adapters.

use super::{DatabaseLockAdapter, LockAdapter, LockError, LockRecord, LockRefresh};
use crate::clock::Clock;
use crate::time::{TimeSpan, Timestamp};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Process-local [`LockAdapter`]. One mutex section per operation keeps
/// acquire/release atomic under interleaved tasks.
#[derive(Debug)]
pub struct MemoryLockAdapter {
    records: Mutex<HashMap<String, LockRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLockAdapter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { records: Mutex::new(HashMap::new()), clock }
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, HashMap<String, LockRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LockAdapter for MemoryLockAdapter {
    async fn acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, LockError> {
        let now = self.clock.now();
        let mut records = self.lock_records();
        if let Some(current) = records.get(key) {
            if current.is_live(now) {
                return Ok(false);
            }
        }
        let expiration = ttl.map(|ttl| now + ttl);
        records.insert(key.to_string(), LockRecord { owner: owner.to_string(), expiration });
        Ok(true)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool, LockError> {
        let now = self.clock.now();
        let mut records = self.lock_records();
        let verdict =
            records.get(key).map(|current| (current.owner == owner, current.is_live(now)));
        match verdict {
            Some((true, true)) => {
                records.remove(key);
                Ok(true)
            }
            Some((_, false)) => {
                // Logically absent; drop the stale row while we're here.
                records.remove(key);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    async fn force_release(&self, key: &str) -> Result<(), LockError> {
        self.lock_records().remove(key);
        Ok(())
    }

    async fn refresh(
        &self,
        key: &str,
        owner: &str,
        ttl: TimeSpan,
    ) -> Result<LockRefresh, LockError> {
        let now = self.clock.now();
        let mut records = self.lock_records();
        match records.get_mut(key) {
            Some(current) if current.owner == owner && current.is_live(now) => {
                match current.expiration {
                    Some(_) => {
                        current.expiration = Some(now + ttl);
                        Ok(LockRefresh::Refreshed)
                    }
                    None => Ok(LockRefresh::Unexpirable),
                }
            }
            _ => Ok(LockRefresh::Unowned),
        }
    }

    async fn find(&self, key: &str) -> Result<Option<LockRecord>, LockError> {
        let now = self.clock.now();
        Ok(self.lock_records().get(key).filter(|record| record.is_live(now)).cloned())
    }
}

/// Process-local [`DatabaseLockAdapter`], used to exercise the derived
/// adapter the way a SQL backend would be.
#[derive(Debug, Default)]
pub struct MemoryDatabaseLockAdapter {
    rows: Mutex<HashMap<String, LockRecord>>,
}

impl MemoryDatabaseLockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_rows(&self) -> std::sync::MutexGuard<'_, HashMap<String, LockRecord>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DatabaseLockAdapter for MemoryDatabaseLockAdapter {
    async fn insert(
        &self,
        key: &str,
        owner: &str,
        expiration: Option<Timestamp>,
    ) -> Result<bool, LockError> {
        let mut rows = self.lock_rows();
        if rows.contains_key(key) {
            return Ok(false);
        }
        rows.insert(key.to_string(), LockRecord { owner: owner.to_string(), expiration });
        Ok(true)
    }

    async fn update_if_expired(
        &self,
        key: &str,
        owner: &str,
        expiration: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<u64, LockError> {
        let mut rows = self.lock_rows();
        match rows.get_mut(key) {
            Some(row) if !row.is_live(now) => {
                *row = LockRecord { owner: owner.to_string(), expiration };
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn remove_if_owner(
        &self,
        key: &str,
        owner: &str,
    ) -> Result<Option<LockRecord>, LockError> {
        let mut rows = self.lock_rows();
        let owned = rows.get(key).is_some_and(|row| row.owner == owner);
        if owned {
            Ok(rows.remove(key))
        } else {
            Ok(None)
        }
    }

    async fn remove(&self, key: &str) -> Result<(), LockError> {
        self.lock_rows().remove(key);
        Ok(())
    }

    async fn update_expiration_if_owner(
        &self,
        key: &str,
        owner: &str,
        expiration: Timestamp,
        now: Timestamp,
    ) -> Result<u64, LockError> {
        let mut rows = self.lock_rows();
        match rows.get_mut(key) {
            Some(row) if row.owner == owner && row.is_live(now) && row.expiration.is_some() => {
                row.expiration = Some(expiration);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn find(&self, key: &str) -> Result<Option<LockRecord>, LockError> {
        Ok(self.lock_rows().get(key).cloned())
    }
}
