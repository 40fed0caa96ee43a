//! Middleware pipeline around an async operation.
//!
//! A [`Pipeline`] applies middlewares outer-to-inner in vector order; each
//! middleware receives a re-runnable [`Next`] plus the [`HookContext`] and
//! decides how many times (if at all) downstream work runs. The context
//! carries a [`CancelToken`] which is also handed to the wrapped operation,
//! so cancellation decided anywhere in the chain propagates into the
//! innermost call.

use crate::cancel::CancelToken;
use crate::error::ResilienceError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Ambient state visible to every middleware in one execution.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    token: CancelToken,
    values: Arc<Mutex<HashMap<String, Value>>>,
}

impl HookContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same shared value bag, different cancel token. Used by middlewares
    /// that give downstream work a separately-abortable token.
    pub fn with_token(&self, token: CancelToken) -> Self {
        Self { token, values: Arc::clone(&self.values) }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn abort(&self, reason: impl Into<String>) {
        self.token.abort(reason);
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).get(key).cloned()
    }
}

type Operation<T, E> =
    Arc<dyn Fn(CancelToken) -> BoxFuture<'static, Result<T, ResilienceError<E>>> + Send + Sync>;

/// A single layer wrapping downstream execution.
pub trait Middleware<T, E>: Send + Sync {
    fn handle(
        &self,
        next: Next<T, E>,
        ctx: HookContext,
    ) -> BoxFuture<'static, Result<T, ResilienceError<E>>>;
}

/// Handle to the rest of the chain. Cloneable and re-runnable: retry calls
/// it once per attempt, hedging several times concurrently.
pub struct Next<T, E> {
    middlewares: Arc<[Arc<dyn Middleware<T, E>>]>,
    index: usize,
    operation: Operation<T, E>,
}

impl<T, E> Clone for Next<T, E> {
    fn clone(&self) -> Self {
        Self {
            middlewares: Arc::clone(&self.middlewares),
            index: self.index,
            operation: Arc::clone(&self.operation),
        }
    }
}

impl<T: Send + 'static, E: Send + 'static> Next<T, E> {
    /// Run the remaining middlewares and finally the operation, which
    /// receives the context's cancel token.
    pub fn run(&self, ctx: HookContext) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
        match self.middlewares.get(self.index) {
            Some(middleware) => {
                let mut next = self.clone();
                next.index += 1;
                middleware.clone().handle(next, ctx)
            }
            None => (self.operation)(ctx.token().clone()),
        }
    }
}

/// Ordered middleware stack. Index 0 is outermost.
pub struct Pipeline<T, E> {
    middlewares: Vec<Arc<dyn Middleware<T, E>>>,
}

impl<T: Send + 'static, E: Send + 'static> Default for Pipeline<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for Pipeline<T, E> {
    fn clone(&self) -> Self {
        Self { middlewares: self.middlewares.clone() }
    }
}

impl<T: Send + 'static, E: Send + 'static> Pipeline<T, E> {
    pub fn new() -> Self {
        Self { middlewares: Vec::new() }
    }

    /// Append a middleware; it wraps everything appended after it.
    pub fn with(mut self, middleware: impl Middleware<T, E> + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn with_arc(mut self, middleware: Arc<dyn Middleware<T, E>>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute `operation` under the stack with a fresh context.
    pub async fn execute<F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: Fn(CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
    {
        self.execute_with(HookContext::new(), operation).await
    }

    /// Execute under a caller-supplied context (shared token/values).
    pub async fn execute_with<F, Fut>(
        &self,
        ctx: HookContext,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: Fn(CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
    {
        let operation: Operation<T, E> = Arc::new(move |token| Box::pin(operation(token)));
        let next =
            Next { middlewares: Arc::from(self.middlewares.as_slice().to_vec()), index: 0, operation };
        next.run(ctx).await
    }
}
