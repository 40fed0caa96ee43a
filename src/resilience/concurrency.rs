//! Concurrency-limit middleware.
//!
//! Bounds how many executions may be in flight at once; excess calls are
//! rejected immediately with `CapacityFull` rather than queued.

use crate::error::ResilienceError;
use crate::hooks::{HookContext, Middleware, Next};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct ConcurrencyLimit {
    permits: Arc<Semaphore>,
    max: usize,
}

impl ConcurrencyLimit {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self { permits: Arc::new(Semaphore::new(max)), max }
    }
}

impl<T, E> Middleware<T, E> for ConcurrencyLimit
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn handle(
        &self,
        next: Next<T, E>,
        ctx: HookContext,
    ) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
        let permits = Arc::clone(&self.permits);
        let max = self.max;

        Box::pin(async move {
            let permit = match permits.try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    return Err(ResilienceError::CapacityFull { in_flight: max, max });
                }
            };
            let result = next.run(ctx).await;
            drop(permit);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Pipeline;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("test error")]
    struct TestError;

    #[tokio::test]
    async fn sequential_calls_all_pass() {
        let pipeline: Pipeline<u32, TestError> = Pipeline::new().with(ConcurrencyLimit::new(2));
        for _ in 0..5 {
            assert_eq!(pipeline.execute(|_| async { Ok(1) }).await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn rejects_when_full() {
        let limit = ConcurrencyLimit::new(1);
        let pipeline: Pipeline<u32, TestError> = Pipeline::new().with(limit.clone());

        let blocker: Pipeline<u32, TestError> = Pipeline::new().with(limit);
        let holder = tokio::spawn(async move {
            blocker
                .execute(|_| async {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    Ok(1)
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = pipeline.execute(|_| async { Ok(2) }).await.unwrap_err();
        assert!(err.is_capacity_full());

        assert_eq!(holder.await.unwrap().unwrap(), 1);
        // Capacity is released once the holder finishes.
        assert_eq!(pipeline.execute(|_| async { Ok(3) }).await.unwrap(), 3);
    }
}
