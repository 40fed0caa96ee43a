//! Hedging middleware: staggered parallel attempts, first success wins.
//!
//! Attempts are launched `delay` apart, each under its own child cancel
//! token. The first success aborts every outstanding sibling; a failure the
//! error policy rejects is surfaced immediately; if every attempt fails the
//! call rejects with `Hedging` carrying all the errors.

use crate::error::ResilienceError;
use crate::hooks::{HookContext, Middleware, Next};
use crate::clock::{RuntimeSleeper, Sleeper};
use crate::time::TimeSpan;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;

type ErrorPolicy<E> = Arc<dyn Fn(&ResilienceError<E>) -> bool + Send + Sync>;

pub struct Hedging<E> {
    attempts: u32,
    delay: TimeSpan,
    error_policy: ErrorPolicy<E>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Hedging<E> {
    pub fn new(attempts: u32, delay: TimeSpan) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
            error_policy: Arc::new(|_| true),
            sleeper: Arc::new(RuntimeSleeper),
        }
    }

    /// Failures the predicate rejects are surfaced immediately instead of
    /// being absorbed into the hedge.
    pub fn error_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&ResilienceError<E>) -> bool + Send + Sync + 'static,
    {
        self.error_policy = Arc::new(policy);
        self
    }

    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }
}

impl<T, E> Middleware<T, E> for Hedging<E>
where
    T: Send + 'static,
    E: Send + Sync + 'static,
{
    fn handle(
        &self,
        next: Next<T, E>,
        ctx: HookContext,
    ) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
        let attempts = self.attempts;
        let delay = self.delay;
        let error_policy = Arc::clone(&self.error_policy);
        let sleeper = Arc::clone(&self.sleeper);

        Box::pin(async move {
            let mut inflight = FuturesUnordered::new();
            let mut tokens = Vec::with_capacity(attempts as usize);
            let mut errors = Vec::new();
            let mut launched = 0u32;

            let mut launch = |inflight: &mut FuturesUnordered<_>,
                              tokens: &mut Vec<_>,
                              launched: &mut u32| {
                let child = ctx.token().child();
                let attempt_ctx = ctx.with_token(child.clone());
                tokens.push(child);
                inflight.push(next.run(attempt_ctx));
                *launched += 1;
                tracing::debug!(attempt = *launched, "hedged attempt launched");
            };

            launch(&mut inflight, &mut tokens, &mut launched);

            loop {
                if inflight.is_empty() {
                    if launched < attempts {
                        launch(&mut inflight, &mut tokens, &mut launched);
                        continue;
                    }
                    return Err(ResilienceError::Hedging { errors });
                }

                tokio::select! {
                    _ = sleeper.sleep(delay), if launched < attempts => {
                        launch(&mut inflight, &mut tokens, &mut launched);
                    }
                    completed = inflight.next() => {
                        match completed {
                            Some(Ok(value)) => {
                                for token in &tokens {
                                    token.abort("hedging sibling won");
                                }
                                return Ok(value);
                            }
                            Some(Err(error)) => {
                                if !(error_policy)(&error) {
                                    for token in &tokens {
                                        token.abort("hedging aborted by error policy");
                                    }
                                    return Err(error);
                                }
                                errors.push(error);
                            }
                            None => {}
                        }
                    }
                }
            }
        })
    }
}
