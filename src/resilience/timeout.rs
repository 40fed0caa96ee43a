//! Timeout middleware.
//!
//! The deadline covers whatever the middleware wraps: placed inside a retry
//! it bounds each attempt, placed outside it bounds the whole retried
//! operation. On expiry the context token is aborted so the wrapped call
//! can stop cooperatively, then `Timeout` is returned.

use crate::error::ResilienceError;
use crate::hooks::{HookContext, Middleware, Next};
use crate::time::TimeSpan;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;

type TimeoutCallback = Arc<dyn Fn() + Send + Sync>;

pub struct Timeout {
    wait_time: TimeSpan,
    on_timeout: Option<TimeoutCallback>,
}

impl Timeout {
    pub fn new(wait_time: TimeSpan) -> Self {
        Self { wait_time, on_timeout: None }
    }

    /// Observe the deadline firing, before the error is surfaced.
    pub fn on_timeout<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(callback));
        self
    }
}

impl<T, E> Middleware<T, E> for Timeout
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn handle(
        &self,
        next: Next<T, E>,
        ctx: HookContext,
    ) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
        let wait_time = self.wait_time;
        let on_timeout = self.on_timeout.clone();

        Box::pin(async move {
            let started = Instant::now();
            match tokio::time::timeout(wait_time.to_duration(), next.run(ctx.clone())).await {
                Ok(result) => result,
                Err(_) => {
                    if let Some(callback) = &on_timeout {
                        callback();
                    }
                    ctx.abort(format!("timed out after {wait_time}"));
                    tracing::debug!(timeout = %wait_time, "operation timed out");
                    Err(ResilienceError::Timeout {
                        elapsed: TimeSpan::from(started.elapsed()),
                        timeout: wait_time,
                    })
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::Backoff;
    use crate::hooks::Pipeline;
    use crate::resilience::Retry;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("test error")]
    struct TestError;

    #[tokio::test]
    async fn fast_operations_pass_through() {
        let pipeline: Pipeline<u32, TestError> =
            Pipeline::new().with(Timeout::new(TimeSpan::from_millis(200)));
        let out = pipeline.execute(|_| async { Ok(1) }).await.unwrap();
        assert_eq!(out, 1);
    }

    #[tokio::test]
    async fn slow_operations_time_out_and_abort_the_token() {
        let fired = Arc::new(AtomicU32::new(0));
        let fired_seen = Arc::clone(&fired);
        let pipeline: Pipeline<u32, TestError> = Pipeline::new().with(
            Timeout::new(TimeSpan::from_millis(30)).on_timeout(move || {
                fired_seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let err = pipeline
            .execute(|token| async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                assert!(token.is_aborted());
                Ok(0)
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        match err {
            ResilienceError::Timeout { elapsed, timeout } => {
                assert_eq!(timeout, TimeSpan::from_millis(30));
                assert!(elapsed >= timeout);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn retry_outside_timeout_counts_each_timeout_as_one_attempt() {
        // Real sleeper and a non-zero backoff: the inner timeout's abort is
        // scoped to its attempt, so the retry loop must wait and re-run
        // rather than see an already-fired token.
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let pipeline: Pipeline<u32, TestError> = Pipeline::new()
            .with(
                Retry::new()
                    .max_attempts(3)
                    .backoff(Backoff::constant(TimeSpan::from_millis(10)).without_jitter()),
            )
            .with(Timeout::new(TimeSpan::from_millis(20)));

        let err = pipeline
            .execute(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(0)
                }
            })
            .await
            .unwrap_err();

        // Each attempt timed out individually, so retry saw three timeouts.
        assert!(err.is_timeout());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeout_outside_retry_bounds_the_whole_operation() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let pipeline: Pipeline<u32, TestError> = Pipeline::new()
            .with(Timeout::new(TimeSpan::from_millis(60)))
            .with(
                Retry::new()
                    .max_attempts(100)
                    .backoff(Backoff::constant(TimeSpan::from_millis(20)).without_jitter()),
            );

        let err = pipeline
            .execute(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(ResilienceError::Inner(TestError)) }
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        let seen = attempts.load(Ordering::SeqCst);
        assert!(seen < 100, "outer timeout should cut the retry loop short, saw {seen} attempts");
    }
}
