//! Shared readers–writer lock: many readers XOR one writer per key.
//!
//! Each [`SharedLock`] handle carries independent reader and writer owner
//! ids, so one handle can act in either role. The adapter keeps the
//! exclusion invariant: a live writer implies no live readers and vice
//! versa.

mod adapter;
mod memory;

pub use adapter::{NoOpSharedLockAdapter, SharedLockAdapter};
pub use memory::MemorySharedLockAdapter;

use crate::lock::{LockRecord, LockRefresh};
use crate::namespace::{Namespace, NamespaceError};
use crate::time::TimeSpan;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SharedLockError {
    #[error("shared lock on {key:?} is already acquired for {role}")]
    KeyAlreadyAcquired { key: String, role: Role },
    #[error("shared lock on {key:?} is not held by {role} {owner:?}")]
    UnownedRelease { key: String, owner: String, role: Role },
    #[error("shared lock on {key:?} cannot be refreshed by {role} {owner:?}")]
    UnownedRefresh { key: String, owner: String, role: Role },
    #[error("shared lock backend failed")]
    Unexpected(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl SharedLockError {
    pub fn unexpected(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unexpected(Arc::new(cause))
    }
}

/// Which side of the lock an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Writer,
    Reader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Writer => write!(f, "writer"),
            Role::Reader => write!(f, "reader"),
        }
    }
}

/// Live view over one key: at most one writer or any number of readers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SharedLockState {
    pub writer: Option<LockRecord>,
    pub readers: Vec<LockRecord>,
}

impl SharedLockState {
    pub fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }
}

/// Facade minting [`SharedLock`] handles over one adapter.
#[derive(Clone)]
pub struct SharedLockProvider {
    adapter: Arc<dyn SharedLockAdapter>,
    namespace: Namespace,
    default_ttl: Option<TimeSpan>,
}

impl SharedLockProvider {
    pub fn new(adapter: Arc<dyn SharedLockAdapter>, namespace: Namespace) -> Self {
        Self { adapter, namespace, default_ttl: None }
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

    pub fn create(&self, key: impl Into<String>) -> Result<SharedLock, NamespaceError> {
        let key = self.namespace.key(key)?;
        Ok(SharedLock {
            adapter: Arc::clone(&self.adapter),
            key: key.to_string(),
            writer_owner: uuid::Uuid::new_v4().to_string(),
            reader_owner: uuid::Uuid::new_v4().to_string(),
            ttl: self.default_ttl,
        })
    }
}

/// Per-key handle with distinct writer/reader identities.
#[derive(Clone)]
pub struct SharedLock {
    adapter: Arc<dyn SharedLockAdapter>,
    key: String,
    writer_owner: String,
    reader_owner: String,
    ttl: Option<TimeSpan>,
}

impl SharedLock {
    pub fn writer_owner(&self) -> &str {
        &self.writer_owner
    }

    pub fn reader_owner(&self) -> &str {
        &self.reader_owner
    }

    pub fn ttl(mut self, ttl: TimeSpan) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Take the writer side; succeeds only when no live writer or reader
    /// exists (renewal by the same writer owner also succeeds).
    pub async fn acquire_writer(&self) -> Result<bool, SharedLockError> {
        let acquired =
            self.adapter.acquire_writer(&self.key, &self.writer_owner, self.ttl).await?;
        if acquired {
            tracing::debug!(key = %self.key, owner = %self.writer_owner, "writer acquired");
        }
        Ok(acquired)
    }

    pub async fn acquire_writer_or_fail(&self) -> Result<(), SharedLockError> {
        if self.acquire_writer().await? {
            Ok(())
        } else {
            Err(SharedLockError::KeyAlreadyAcquired { key: self.key.clone(), role: Role::Writer })
        }
    }

    /// Join the reader side; succeeds whenever no live writer exists.
    pub async fn acquire_reader(&self) -> Result<bool, SharedLockError> {
        let acquired =
            self.adapter.acquire_reader(&self.key, &self.reader_owner, self.ttl).await?;
        if acquired {
            tracing::debug!(key = %self.key, owner = %self.reader_owner, "reader acquired");
        }
        Ok(acquired)
    }

    pub async fn acquire_reader_or_fail(&self) -> Result<(), SharedLockError> {
        if self.acquire_reader().await? {
            Ok(())
        } else {
            Err(SharedLockError::KeyAlreadyAcquired { key: self.key.clone(), role: Role::Reader })
        }
    }

    pub async fn release_writer(&self) -> Result<bool, SharedLockError> {
        self.adapter.release_writer(&self.key, &self.writer_owner).await
    }

    pub async fn release_writer_or_fail(&self) -> Result<(), SharedLockError> {
        if self.release_writer().await? {
            Ok(())
        } else {
            Err(SharedLockError::UnownedRelease {
                key: self.key.clone(),
                owner: self.writer_owner.clone(),
                role: Role::Writer,
            })
        }
    }

    pub async fn release_reader(&self) -> Result<bool, SharedLockError> {
        self.adapter.release_reader(&self.key, &self.reader_owner).await
    }

    pub async fn release_reader_or_fail(&self) -> Result<(), SharedLockError> {
        if self.release_reader().await? {
            Ok(())
        } else {
            Err(SharedLockError::UnownedRelease {
                key: self.key.clone(),
                owner: self.reader_owner.clone(),
                role: Role::Reader,
            })
        }
    }

    pub async fn refresh_writer(&self, ttl: TimeSpan) -> Result<LockRefresh, SharedLockError> {
        self.adapter.refresh_writer(&self.key, &self.writer_owner, ttl).await
    }

    pub async fn refresh_reader(&self, ttl: TimeSpan) -> Result<LockRefresh, SharedLockError> {
        self.adapter.refresh_reader(&self.key, &self.reader_owner, ttl).await
    }

    /// Clear every lease on the key regardless of ownership.
    pub async fn force_release(&self) -> Result<(), SharedLockError> {
        tracing::warn!(key = %self.key, "shared lock force-released");
        self.adapter.force_release(&self.key).await
    }

    pub async fn get_state(&self) -> Result<SharedLockState, SharedLockError> {
        self.adapter.get_state(&self.key).await
    }
}
