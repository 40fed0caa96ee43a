//! Deferred, memoized async computations.
//!
//! A [`Lazy`] wraps a producer closure and runs it at most once, on first
//! await; the outcome (success or failure) is memoized, so later awaits and
//! clones observe the same result. Resilience middleware — retry, timeout,
//! abort — is attached at construction, before anything executes. Rust
//! futures are already lazy; this type adds the at-most-once guarantee, a
//! fire-and-forget [`Lazy::defer`], and the construction-time middleware
//! hook point.

use crate::cancel::CancelToken;
use crate::error::ResilienceError;
use crate::hooks::{HookContext, Pipeline};
use crate::resilience::{Abortable, Retry, Timeout};
use crate::time::TimeSpan;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::future::{Future, IntoFuture};
use std::sync::{Arc, Mutex};

type Producer<T, E> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type SharedOutcome<T, E> = Shared<BoxFuture<'static, Result<T, ResilienceError<E>>>>;

pub struct Lazy<T, E> {
    producer: Producer<T, E>,
    pipeline: Pipeline<T, E>,
    token: CancelToken,
    cell: Arc<Mutex<Option<SharedOutcome<T, E>>>>,
}

impl<T, E> Clone for Lazy<T, E> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            pipeline: self.pipeline.clone(),
            token: self.token.clone(),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T, E> Lazy<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            producer: Arc::new(move || Box::pin(producer())),
            pipeline: Pipeline::new(),
            token: CancelToken::new(),
            cell: Arc::new(Mutex::new(None)),
        }
    }

    /// Attach a retry middleware. Must be configured before the first await.
    pub fn with_retry(mut self, retry: Retry<E>) -> Self
    where
        E: std::error::Error,
    {
        self.pipeline = self.pipeline.with(retry);
        self
    }

    /// Attach a per-execution timeout.
    pub fn with_timeout(mut self, wait_time: TimeSpan) -> Self {
        self.pipeline = self.pipeline.with(Timeout::new(wait_time));
        self
    }

    /// Bind an external cancel token; aborting it rejects the computation.
    pub fn with_abort(mut self, token: &CancelToken) -> Self {
        self.token = token.child();
        self.pipeline = self.pipeline.with(Abortable);
        self
    }

    fn force(&self) -> SharedOutcome<T, E> {
        let mut cell = self.cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(shared) = cell.as_ref() {
            return shared.clone();
        }
        let pipeline = self.pipeline.clone();
        let producer = Arc::clone(&self.producer);
        let ctx = HookContext::new().with_token(self.token.clone());
        let future: BoxFuture<'static, Result<T, ResilienceError<E>>> = Box::pin(async move {
            pipeline
                .execute_with(ctx, move |_token| {
                    let run = producer();
                    async move { run.await.map_err(ResilienceError::Inner) }
                })
                .await
        });
        let shared = future.shared();
        *cell = Some(shared.clone());
        shared
    }

    /// Await the memoized outcome, starting the producer if needed.
    pub fn get(&self) -> impl Future<Output = Result<T, ResilienceError<E>>> {
        self.force()
    }

    /// Start execution in the background and discard the outcome.
    pub fn defer(&self) {
        let shared = self.force();
        tokio::spawn(async move {
            let _ = shared.await;
        });
    }
}

impl<T, E> IntoFuture for Lazy<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Output = Result<T, ResilienceError<E>>;
    type IntoFuture = SharedOutcome<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        self.force()
    }
}
