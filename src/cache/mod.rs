//! TTL cache with group scoping over a pluggable backend.
//!
//! Values cross the adapter boundary as `serde_json::Value`, so any
//! serde-serializable type can be stored. Expiration is logical: reads
//! filter out expired entries whether or not a sweeper has physically
//! removed them. An optional background sweeper can be started per
//! provider; correctness never depends on it.

mod adapter;
mod memory;

pub use adapter::{
    CacheAdapter, CacheBackend, CacheEntry, DatabaseCacheAdapter, DerivedCacheAdapter,
    NoOpCacheAdapter,
};
pub use memory::{MemoryCacheAdapter, MemoryDatabaseCacheAdapter};

use crate::cancel::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::namespace::{Namespace, NamespaceError};
use crate::codec::SerdeError;
use crate::time::TimeSpan;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("value under {key:?} is not numeric")]
    Type { key: String },
    #[error("cache value failed to (de)serialize")]
    Serialization(#[from] SerdeError),
    #[error("cache backend failed")]
    Unexpected(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
    pub fn unexpected(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unexpected(Arc::new(cause))
    }
}

/// Facade over one cache adapter, scoped to a namespace group.
#[derive(Clone)]
pub struct CacheProvider {
    adapter: Arc<dyn CacheAdapter>,
    namespace: Namespace,
    default_ttl: Option<TimeSpan>,
    sweeper: Arc<Mutex<Option<SweeperHandle>>>,
}

struct SweeperHandle {
    token: CancelToken,
    task: tokio::task::JoinHandle<()>,
}

impl CacheProvider {
    pub fn new(backend: impl Into<CacheBackend>, namespace: Namespace) -> Self {
        Self::with_clock(backend, namespace, Arc::new(SystemClock))
    }

    /// Share a clock between the provider and a derived database adapter.
    pub fn with_clock(
        backend: impl Into<CacheBackend>,
        namespace: Namespace,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            adapter: backend.into().resolve(clock),
            namespace,
            default_ttl: None,
            sweeper: Arc::new(Mutex::new(None)),
        }
    }

    /// TTL applied when a write doesn't specify one.
    pub fn default_ttl(mut self, ttl: TimeSpan) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn group(&self) -> String {
        self.namespace.group()
    }

    /// Derive a provider one group deeper; groups are fully independent
    /// ([`CacheProvider::clear`] does not cross them).
    pub fn with_group(&self, group: impl Into<String>) -> Result<Self, NamespaceError> {
        Ok(Self {
            adapter: Arc::clone(&self.adapter),
            namespace: self.namespace.with_group(group)?,
            default_ttl: self.default_ttl,
            sweeper: Arc::new(Mutex::new(None)),
        })
    }

    fn render(&self, key: &str) -> Result<String, CacheError> {
        self.namespace
            .key(key)
            .map(|key| key.to_string())
            .map_err(|e| CacheError::unexpected(e))
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Value, CacheError> {
        serde_json::to_value(value)
            .map_err(|e| CacheError::Serialization(SerdeError::serialization(e)))
    }

    /// Live value under `key`, or `None` (missing and expired alike).
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let key = self.render(key)?;
        match self.adapter.get(&key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| CacheError::Serialization(SerdeError::deserialization(e))),
            None => Ok(None),
        }
    }

    /// Live value or a fallback.
    pub async fn get_or<T: DeserializeOwned>(
        &self,
        key: &str,
        fallback: T,
    ) -> Result<T, CacheError> {
        Ok(self.get(key).await?.unwrap_or(fallback))
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let key = self.render(key)?;
        Ok(self.adapter.get(&key).await?.is_some())
    }

    /// Insert only if absent; `true` iff inserted.
    pub async fn add<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, CacheError> {
        let rendered = self.render(key)?;
        let value = self.encode(value)?;
        self.adapter.add(&rendered, value, ttl.or(self.default_ttl)).await
    }

    /// Upsert; `true` iff a previous live entry was replaced.
    pub async fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<TimeSpan>,
    ) -> Result<bool, CacheError> {
        let rendered = self.render(key)?;
        let value = self.encode(value)?;
        self.adapter.put(&rendered, value, ttl.or(self.default_ttl)).await
    }

    /// Replace only if present and live, preserving the TTL; `true` iff
    /// replaced.
    pub async fn update<T: Serialize>(&self, key: &str, value: &T) -> Result<bool, CacheError> {
        let rendered = self.render(key)?;
        let value = self.encode(value)?;
        self.adapter.update(&rendered, value).await
    }

    /// Atomic numeric add. `false` when the key is absent or expired;
    /// `CacheError::Type` when the stored value is not a number.
    pub async fn increment(&self, key: &str, delta: f64) -> Result<bool, CacheError> {
        let rendered = self.render(key)?;
        self.adapter.increment(&rendered, delta).await
    }

    /// `true` iff a live entry was removed.
    pub async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let rendered = self.render(key)?;
        self.adapter.remove_many(&[rendered]).await
    }

    /// `true` iff at least one live entry was removed.
    pub async fn remove_many(&self, keys: &[&str]) -> Result<bool, CacheError> {
        let rendered: Vec<String> =
            keys.iter().map(|key| self.render(key)).collect::<Result<_, _>>()?;
        self.adapter.remove_many(&rendered).await
    }

    /// Drop every entry in this group (subgroups included, parents not).
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.adapter.remove_by_prefix(&self.namespace.prefix()).await
    }

    /// Start a periodic expired-key sweep. Idempotent per provider value;
    /// call [`CacheProvider::stop_sweeper`] to stop it.
    pub fn start_sweeper(&self, interval: TimeSpan) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if sweeper.is_some() {
            return;
        }
        let adapter = Arc::clone(&self.adapter);
        let token = CancelToken::new();
        let watch = token.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = watch.cancelled() => break,
                    _ = tokio::time::sleep(interval.to_duration()) => {}
                }
                match adapter.remove_expired().await {
                    Ok(removed) if removed > 0 => {
                        tracing::debug!(removed, "cache sweep removed expired keys");
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(%error, "cache sweep failed");
                    }
                }
            }
        });
        *sweeper = Some(SweeperHandle { token, task });
    }

    pub fn stop_sweeper(&self) {
        let handle = self.sweeper.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(handle) = handle {
            handle.token.abort("sweeper stopped");
            handle.task.abort();
        }
    }
}
