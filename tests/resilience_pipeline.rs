use lockstep::{
    Backoff, Hedging, Lazy, NoOpSleeper, Pipeline, ResilienceError, Retry, TimeSpan, Timeout,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backend error: {0}")]
struct Backend(&'static str);

#[tokio::test]
async fn hedging_resolves_with_the_first_success() {
    let pipeline: Pipeline<&'static str, Backend> =
        Pipeline::new().with(Hedging::new(3, TimeSpan::from_millis(50)));

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let started = Instant::now();

    let out = pipeline
        .execute(move |token| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    // The first attempt hangs until a sibling wins.
                    0 => {
                        token.cancelled().await;
                        Err(ResilienceError::Aborted { reason: "sibling won".into() })
                    }
                    // The second attempt resolves ~70ms after its launch.
                    _ => {
                        tokio::time::sleep(Duration::from_millis(70)).await;
                        Ok("v")
                    }
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(out, "v");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "second attempt launched at +50ms");
    assert!(elapsed < Duration::from_millis(400), "nobody waited for the hung attempt");
}

#[tokio::test]
async fn retry_then_timeout_bounds_each_attempt() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let pipeline: Pipeline<u32, Backend> = Pipeline::new()
        .with(
            Retry::new()
                .max_attempts(3)
                .backoff(Backoff::constant(TimeSpan::ZERO).without_jitter())
                .sleeper(NoOpSleeper),
        )
        .with(Timeout::new(TimeSpan::from_millis(40)));

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

    assert!(err.is_timeout());
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "each timeout counted as one attempt");
}

#[tokio::test]
async fn timeout_then_retry_bounds_the_whole_operation() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let pipeline: Pipeline<u32, Backend> = Pipeline::new()
        .with(Timeout::new(TimeSpan::from_millis(100)))
        .with(
            Retry::new()
                .max_attempts(1_000)
                .backoff(Backoff::constant(TimeSpan::from_millis(25)).without_jitter()),
        );

    let err = pipeline
        .execute(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(ResilienceError::Inner(Backend("down"))) }
        })
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    let seen = attempts.load(Ordering::SeqCst);
    assert!(seen >= 2 && seen < 20, "a handful of attempts fit in the window, saw {seen}");
}

#[tokio::test]
async fn retry_recovers_before_the_outer_timeout() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let pipeline: Pipeline<&'static str, Backend> = Pipeline::new()
        .with(Timeout::new(TimeSpan::from_secs(5)))
        .with(
            Retry::new()
                .max_attempts(5)
                .backoff(Backoff::constant(TimeSpan::from_millis(5)).without_jitter()),
        );

    let out = pipeline
        .execute(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ResilienceError::Inner(Backend("flaky")))
                } else {
                    Ok("recovered")
                }
            }
        })
        .await
        .unwrap();
    assert_eq!(out, "recovered");
}

#[tokio::test]
async fn lazy_computation_with_middleware_runs_once_for_all_clones() {
    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let lazy: Lazy<u64, Backend> = Lazy::new(move || {
        let counter = Arc::clone(&counter);
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Backend("cold start"))
            } else {
                Ok(99)
            }
        }
    })
    .with_retry(
        Retry::new()
            .max_attempts(2)
            .backoff(Backoff::constant(TimeSpan::ZERO).without_jitter())
            .sleeper(NoOpSleeper),
    )
    .with_timeout(TimeSpan::from_secs(1));

    let clone = lazy.clone();
    let (a, b) = tokio::join!(lazy.get(), clone.get());
    assert_eq!(a.unwrap(), 99);
    assert_eq!(b.unwrap(), 99);
    assert_eq!(runs.load(Ordering::SeqCst), 2, "one failure, one retry, shared by clones");
}
