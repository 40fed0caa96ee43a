//! Cooperative cancellation.
//!
//! A [`CancelToken`] is a cheap-clone abort channel shared by a middleware
//! pipeline and the operation it wraps. The first `abort` wins; later calls
//! are ignored. Child tokens observe their parent, so a hedged attempt can
//! be cancelled individually or together with its siblings.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Raised when a future is cut short by its [`CancelToken`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("aborted: {reason}")]
pub struct AbortError {
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<Option<String>>>,
    parent: Option<Box<CancelToken>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { state: Arc::new(tx), parent: None }
    }

    /// Derive a token that is aborted whenever `self` is, but can also be
    /// aborted on its own without affecting `self`.
    pub fn child(&self) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { state: Arc::new(tx), parent: Some(Box::new(self.clone())) }
    }

    /// Fire the token. The first reason sticks.
    pub fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.state.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    pub fn is_aborted(&self) -> bool {
        self.reason().is_some()
    }

    /// The abort reason, considering parents; `None` while live.
    pub fn reason(&self) -> Option<String> {
        if let Some(reason) = self.state.borrow().clone() {
            return Some(reason);
        }
        self.parent.as_ref().and_then(|p| p.reason())
    }

    /// Resolve once the token (or any ancestor) aborts, yielding the reason.
    /// Pending forever if the token is never aborted.
    pub async fn cancelled(&self) -> String {
        // Walk the ancestor chain up front instead of recursing; a
        // recursive async fn would not have a finite size.
        let mut receivers = Vec::new();
        let mut current = Some(self);
        while let Some(token) = current {
            if let Some(reason) = token.state.borrow().clone() {
                return reason;
            }
            receivers.push(token.state.subscribe());
            current = token.parent.as_deref();
        }

        let waiters: Vec<_> = receivers
            .into_iter()
            .map(|mut rx| {
                Box::pin(async move {
                    loop {
                        if let Some(reason) = rx.borrow_and_update().clone() {
                            return reason;
                        }
                        if rx.changed().await.is_err() {
                            // Sender kept alive by the token; unreachable in practice.
                            futures::future::pending::<()>().await;
                        }
                    }
                })
            })
            .collect();
        let (reason, _, _) = futures::future::select_all(waiters).await;
        reason
    }
}

/// Race `future` against `token`; an abort rejects with [`AbortError`]
/// carrying the token's reason.
pub async fn abortable<F: std::future::Future>(
    future: F,
    token: &CancelToken,
) -> Result<F::Output, AbortError> {
    tokio::select! {
        reason = token.cancelled() => Err(AbortError { reason }),
        out = future => Ok(out),
    }
}
