//! In-memory semaphore adapter.

use super::{is_live, SemaphoreAdapter, SemaphoreError, SemaphoreRecord};
use crate::clock::Clock;
use crate::time::TimeSpan;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Process-local [`SemaphoreAdapter`]. The limit check and the slot insert
/// share one mutex section, which is the transactionality the contract
/// demands.
#[derive(Debug)]
pub struct MemorySemaphoreAdapter {
    records: Mutex<HashMap<String, SemaphoreRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemorySemaphoreAdapter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { records: Mutex::new(HashMap::new()), clock }
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<String, SemaphoreRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SemaphoreAdapter for MemorySemaphoreAdapter {
    async fn acquire(
        &self,
        key: &str,
        slot_id: &str,
        limit: u32,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, SemaphoreError> {
        let now = self.clock.now();
        let mut records = self.lock_records();
        let expiration = ttl.map(|ttl| now + ttl);

        if let Some(record) = records.get_mut(key) {
            if record.limit != limit {
                return Err(SemaphoreError::LimitMismatch {
                    key: key.to_string(),
                    stored: record.limit,
                    requested: limit,
                });
            }
            record.slots.retain(|_, expiration| is_live(*expiration, now));
            if record.slots.contains_key(slot_id) {
                // Re-acquire by the same slot renews its lease.
                record.slots.insert(slot_id.to_string(), expiration);
                return Ok(true);
            }
            if record.slots.len() >= record.limit as usize {
                return Ok(false);
            }
            record.slots.insert(slot_id.to_string(), expiration);
            return Ok(true);
        }

        let mut slots = HashMap::new();
        slots.insert(slot_id.to_string(), expiration);
        records.insert(key.to_string(), SemaphoreRecord { limit, slots });
        Ok(true)
    }

    async fn release(&self, key: &str, slot_id: &str) -> Result<bool, SemaphoreError> {
        let now = self.clock.now();
        let mut records = self.lock_records();
        let Some(record) = records.get_mut(key) else {
            return Ok(false);
        };
        let released =
            record.slots.remove(slot_id).is_some_and(|expiration| is_live(expiration, now));
        record.slots.retain(|_, expiration| is_live(*expiration, now));
        if record.slots.is_empty() {
            records.remove(key);
        }
        Ok(released)
    }

    async fn refresh(
        &self,
        key: &str,
        slot_id: &str,
        ttl: TimeSpan,
    ) -> Result<bool, SemaphoreError> {
        let now = self.clock.now();
        let mut records = self.lock_records();
        let Some(record) = records.get_mut(key) else {
            return Ok(false);
        };
        match record.slots.get_mut(slot_id) {
            Some(expiration) if is_live(*expiration, now) => {
                if expiration.is_some() {
                    *expiration = Some(now + ttl);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn force_release_all(&self, key: &str) -> Result<(), SemaphoreError> {
        self.lock_records().remove(key);
        Ok(())
    }

    async fn get_state(&self, key: &str) -> Result<Option<SemaphoreRecord>, SemaphoreError> {
        Ok(self.lock_records().get(key).cloned())
    }
}
