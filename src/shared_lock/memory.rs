//! In-memory shared lock adapter.

use super::{SharedLockAdapter, SharedLockError, SharedLockState};
use crate::clock::Clock;
use crate::lock::{LockRecord, LockRefresh};
use crate::time::{TimeSpan, Timestamp};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Entry {
    writer: Option<LockRecord>,
    readers: HashMap<String, Option<Timestamp>>,
}

impl Entry {
    fn live_writer(&self, now: Timestamp) -> Option<&LockRecord> {
        self.writer.as_ref().filter(|w| w.is_live(now))
    }

    fn has_live_readers(&self, now: Timestamp) -> bool {
        self.readers.values().any(|expiration| is_live(*expiration, now))
    }

    fn prune(&mut self, now: Timestamp) {
        if self.writer.as_ref().is_some_and(|w| !w.is_live(now)) {
            self.writer = None;
        }
        self.readers.retain(|_, expiration| is_live(*expiration, now));
    }

    fn is_empty(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }
}

fn is_live(expiration: Option<Timestamp>, now: Timestamp) -> bool {
    match expiration {
        Some(expiration) => expiration > now,
        None => true,
    }
}

/// Process-local [`SharedLockAdapter`]. Each operation prunes expired
/// leases and transitions inside one mutex section, keeping the
/// writer-XOR-readers invariant airtight under interleaved tasks.
#[derive(Debug)]
pub struct MemorySharedLockAdapter {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemorySharedLockAdapter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), clock }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SharedLockAdapter for MemorySharedLockAdapter {
    async fn acquire_writer(
        &self,
        key: &str,
        owner: &str,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, SharedLockError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let entry = entries.entry(key.to_string()).or_default();
        entry.prune(now);

        if entry.has_live_readers(now) {
            return Ok(false);
        }
        if let Some(writer) = entry.live_writer(now) {
            if writer.owner != owner {
                return Ok(false);
            }
        }
        let expiration = ttl.map(|ttl| now + ttl);
        entry.writer = Some(LockRecord { owner: owner.to_string(), expiration });
        Ok(true)
    }

    async fn acquire_reader(
        &self,
        key: &str,
        owner: &str,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, SharedLockError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let entry = entries.entry(key.to_string()).or_default();
        entry.prune(now);

        if entry.live_writer(now).is_some() {
            return Ok(false);
        }
        let expiration = ttl.map(|ttl| now + ttl);
        entry.readers.insert(owner.to_string(), expiration);
        Ok(true)
    }

    async fn release_writer(&self, key: &str, owner: &str) -> Result<bool, SharedLockError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        entry.prune(now);
        // prune() already dropped an expired writer, so presence means live.
        let released = entry.writer.as_ref().is_some_and(|writer| writer.owner == owner);
        if released {
            entry.writer = None;
        }
        if entry.is_empty() {
            entries.remove(key);
        }
        Ok(released)
    }

    async fn release_reader(&self, key: &str, owner: &str) -> Result<bool, SharedLockError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        entry.prune(now);
        let released = entry.readers.remove(owner).is_some();
        if entry.is_empty() {
            entries.remove(key);
        }
        Ok(released)
    }

    async fn refresh_writer(
        &self,
        key: &str,
        owner: &str,
        ttl: TimeSpan,
    ) -> Result<LockRefresh, SharedLockError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(LockRefresh::Unowned);
        };
        match &mut entry.writer {
            Some(writer) if writer.owner == owner && writer.is_live(now) => {
                match writer.expiration {
                    Some(_) => {
                        writer.expiration = Some(now + ttl);
                        Ok(LockRefresh::Refreshed)
                    }
                    None => Ok(LockRefresh::Unexpirable),
                }
            }
            _ => Ok(LockRefresh::Unowned),
        }
    }

    async fn refresh_reader(
        &self,
        key: &str,
        owner: &str,
        ttl: TimeSpan,
    ) -> Result<LockRefresh, SharedLockError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(LockRefresh::Unowned);
        };
        match entry.readers.get_mut(owner) {
            Some(expiration) if is_live(*expiration, now) => match expiration {
                Some(_) => {
                    *expiration = Some(now + ttl);
                    Ok(LockRefresh::Refreshed)
                }
                None => Ok(LockRefresh::Unexpirable),
            },
            _ => Ok(LockRefresh::Unowned),
        }
    }

    async fn force_release(&self, key: &str) -> Result<(), SharedLockError> {
        self.lock_entries().remove(key);
        Ok(())
    }

    async fn get_state(&self, key: &str) -> Result<SharedLockState, SharedLockError> {
        let now = self.clock.now();
        let entries = self.lock_entries();
        let Some(entry) = entries.get(key) else {
            return Ok(SharedLockState::default());
        };
        let mut readers: Vec<LockRecord> = entry
            .readers
            .iter()
            .filter(|(_, expiration)| is_live(**expiration, now))
            .map(|(owner, expiration)| LockRecord { owner: owner.clone(), expiration: *expiration })
            .collect();
        readers.sort_by(|a, b| a.owner.cmp(&b.owner));
        Ok(SharedLockState { writer: entry.live_writer(now).cloned(), readers })
    }
}
