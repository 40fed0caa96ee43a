//! Retry middleware with backoff, error policy, and cancel-aware waits.

use crate::backoff::Backoff;
use crate::clock::{RuntimeSleeper, Sleeper};
use crate::error::{ResilienceError, MAX_RETRY_FAILURES};
use crate::hooks::{HookContext, Middleware, Next};
use futures::future::BoxFuture;
use std::sync::Arc;

type ErrorPolicy<E> = Arc<dyn Fn(&ResilienceError<E>) -> bool + Send + Sync>;
type RetryCallback<E> = Arc<dyn Fn(u32, &ResilienceError<E>) + Send + Sync>;
type FailureCallback<E> = Arc<dyn Fn(&ResilienceError<E>) + Send + Sync>;

/// Retries downstream failures per an error policy, sleeping between
/// attempts according to the backoff. Aborts are never retried, and the
/// inter-attempt wait races the context token.
pub struct Retry<E> {
    max_attempts: u32,
    backoff: Backoff,
    error_policy: ErrorPolicy<E>,
    on_retry: Option<RetryCallback<E>>,
    on_failure: Option<FailureCallback<E>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Retry<E> {
    pub fn new() -> Self {
        Self {
            max_attempts: 4,
            backoff: Backoff::default(),
            error_policy: Arc::new(|_| true),
            on_retry: None,
            on_failure: None,
            sleeper: Arc::new(RuntimeSleeper),
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Retry only failures the predicate accepts; others pass through
    /// unchanged. The default accepts everything (aborts excepted).
    pub fn error_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&ResilienceError<E>) -> bool + Send + Sync + 'static,
    {
        self.error_policy = Arc::new(policy);
        self
    }

    /// Observe each failure that will be retried, with its attempt number.
    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32, &ResilienceError<E>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// Observe the final error before it is surfaced.
    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ResilienceError<E>) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(callback));
        self
    }

    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }
}

impl<E> Default for Retry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Middleware<T, E> for Retry<E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn handle(
        &self,
        next: Next<T, E>,
        ctx: HookContext,
    ) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
        let max_attempts = self.max_attempts;
        let backoff = self.backoff.clone();
        let error_policy = Arc::clone(&self.error_policy);
        let on_retry = self.on_retry.clone();
        let on_failure = self.on_failure.clone();
        let sleeper = Arc::clone(&self.sleeper);

        Box::pin(async move {
            let mut failures: Vec<E> = Vec::new();
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                // Every attempt runs under its own child token: an
                // attempt-scoped abort (an inner timeout) must not bleed
                // into the waits or attempts after it.
                let attempt_token = ctx.token().child();
                let error = match next.run(ctx.with_token(attempt_token)).await {
                    Ok(value) => return Ok(value),
                    Err(error) => error,
                };

                let terminal = error.is_aborted() || !(error_policy)(&error);
                if terminal || attempt >= max_attempts {
                    let surfaced = match error {
                        ResilienceError::Inner(e) if !terminal => {
                            push_bounded(&mut failures, e);
                            ResilienceError::RetryExhausted { attempts: attempt, failures }
                        }
                        other => other,
                    };
                    if let Some(callback) = &on_failure {
                        callback(&surfaced);
                    }
                    return Err(surfaced);
                }

                if let Some(callback) = &on_retry {
                    callback(attempt, &error);
                }
                let delay = match &error {
                    ResilienceError::Inner(e) => {
                        backoff.delay(attempt, Some(e as &(dyn std::error::Error + 'static)))
                    }
                    _ => backoff.delay(attempt, None),
                };
                if let ResilienceError::Inner(e) = error {
                    push_bounded(&mut failures, e);
                }
                tracing::debug!(attempt, delay = %delay, "retrying after failure");

                // The wait races a fresh child, which observes only
                // caller-level aborts, never the finished attempt's.
                let wait_token = ctx.token().child();
                tokio::select! {
                    reason = wait_token.cancelled() => {
                        return Err(ResilienceError::Aborted { reason });
                    }
                    _ = sleeper.sleep(delay) => {}
                }
            }
        })
    }
}

fn push_bounded<E>(failures: &mut Vec<E>, error: E) {
    failures.push(error);
    if failures.len() > MAX_RETRY_FAILURES {
        let excess = failures.len() - MAX_RETRY_FAILURES;
        failures.drain(0..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{NoOpSleeper, RecordingSleeper};
    use crate::hooks::Pipeline;
    use crate::time::TimeSpan;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("flaky: {0}")]
    struct Flaky(&'static str);

    fn retrying(max: u32) -> Retry<Flaky> {
        Retry::new()
            .max_attempts(max)
            .backoff(Backoff::constant(TimeSpan::from_millis(5)).without_jitter())
            .sleeper(NoOpSleeper)
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let pipeline: Pipeline<u32, Flaky> = Pipeline::new().with(retrying(4));
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let out = pipeline
            .execute(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ResilienceError::Inner(Flaky("not yet")))
                    } else {
                        Ok(9)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(out, 9);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_carries_the_failure_history() {
        let pipeline: Pipeline<u32, Flaky> = Pipeline::new().with(retrying(3));
        let err = pipeline
            .execute(|_| async { Err::<u32, _>(ResilienceError::Inner(Flaky("always"))) })
            .await
            .unwrap_err();

        match err {
            ResilienceError::RetryExhausted { attempts, failures } => {
                assert_eq!(attempts, 3);
                assert_eq!(failures.len(), 3);
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_policy_short_circuits() {
        let pipeline: Pipeline<u32, Flaky> = Pipeline::new().with(
            retrying(5).error_policy(|e| !matches!(e.as_inner(), Some(Flaky("fatal")))),
        );
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let err = pipeline
            .execute(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(ResilienceError::Inner(Flaky("fatal")))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err, ResilienceError::Inner(Flaky("fatal")));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waits_follow_the_backoff() {
        let sleeper = RecordingSleeper::new();
        let pipeline: Pipeline<u32, Flaky> = Pipeline::new().with(
            Retry::new()
                .max_attempts(3)
                .backoff(
                    Backoff::linear_between(TimeSpan::from_millis(100), TimeSpan::from_secs(1))
                        .without_jitter(),
                )
                .sleeper(sleeper.clone()),
        );

        let _ = pipeline
            .execute(|_| async { Err::<u32, _>(ResilienceError::Inner(Flaky("x"))) })
            .await;

        assert_eq!(
            sleeper.recorded(),
            vec![TimeSpan::from_millis(100), TimeSpan::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn attempt_scoped_aborts_do_not_poison_later_attempts() {
        // The operation aborts the token it was handed (as an inner timeout
        // would) but surfaces an ordinary error; every attempt must still
        // run, and the inter-attempt wait must not short-circuit. Uses the
        // default runtime sleeper with a real delay on purpose.
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let pipeline: Pipeline<u32, Flaky> = Pipeline::new().with(
            Retry::new()
                .max_attempts(3)
                .backoff(Backoff::constant(TimeSpan::from_millis(5)).without_jitter()),
        );

        let err = pipeline
            .execute(move |token| {
                counter.fetch_add(1, Ordering::SeqCst);
                token.abort("this attempt is done");
                async { Err::<u32, _>(ResilienceError::Inner(Flaky("x"))) }
            })
            .await
            .unwrap_err();

        assert!(err.is_retry_exhausted());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn aborts_are_never_retried() {
        let pipeline: Pipeline<u32, Flaky> = Pipeline::new().with(retrying(5));
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let err = pipeline
            .execute(move |token| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    token.abort("caller gave up");
                    Err::<u32, _>(ResilienceError::Aborted { reason: "caller gave up".into() })
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_aborted());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn callbacks_fire_per_retry_and_on_failure() {
        let retries = Arc::new(AtomicU32::new(0));
        let failures = Arc::new(AtomicU32::new(0));
        let retries_seen = Arc::clone(&retries);
        let failures_seen = Arc::clone(&failures);

        let pipeline: Pipeline<u32, Flaky> = Pipeline::new().with(
            retrying(3)
                .on_retry(move |_, _| {
                    retries_seen.fetch_add(1, Ordering::SeqCst);
                })
                .on_failure(move |_| {
                    failures_seen.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let _ = pipeline
            .execute(|_| async { Err::<u32, _>(ResilienceError::Inner(Flaky("x"))) })
            .await;

        assert_eq!(retries.load(Ordering::SeqCst), 2);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }
}
