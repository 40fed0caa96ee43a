//! Abortable middleware: races downstream work against the context token.

use crate::error::ResilienceError;
use crate::hooks::{HookContext, Middleware, Next};
use futures::future::BoxFuture;

/// Rejects with `Aborted` as soon as the context token fires, even if the
/// wrapped operation never checks the token itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct Abortable;

impl<T, E> Middleware<T, E> for Abortable
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn handle(
        &self,
        next: Next<T, E>,
        ctx: HookContext,
    ) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
        Box::pin(async move {
            tokio::select! {
                reason = ctx.token().cancelled() => Err(ResilienceError::Aborted { reason }),
                result = next.run(ctx.clone()) => result,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::hooks::Pipeline;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("test error")]
    struct TestError;

    #[tokio::test]
    async fn completion_wins_when_token_is_silent() {
        let pipeline: Pipeline<u32, TestError> = Pipeline::new().with(Abortable);
        assert_eq!(pipeline.execute(|_| async { Ok(3) }).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn abort_cuts_a_hung_operation_short() {
        let token = CancelToken::new();
        let ctx = crate::hooks::HookContext::new().with_token(token.clone());
        let pipeline: Pipeline<u32, TestError> = Pipeline::new().with(Abortable);

        let racing = pipeline.execute_with(ctx, |_| futures::future::pending::<_>());
        tokio::pin!(racing);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            _ = &mut racing => panic!("operation should still be pending"),
        }
        token.abort("caller cancelled");

        let err = racing.await.unwrap_err();
        assert_eq!(err, ResilienceError::Aborted { reason: "caller cancelled".into() });
    }
}
