use lockstep::{
    MemorySemaphoreAdapter, Namespace, Semaphore, SemaphoreProvider, SemaphoreState, SystemClock,
    TimeSpan,
};
use std::sync::Arc;

fn provider() -> SemaphoreProvider {
    let clock = Arc::new(SystemClock);
    SemaphoreProvider::new(
        Arc::new(MemorySemaphoreAdapter::new(clock.clone())),
        Namespace::new("it").unwrap(),
    )
    .clock(clock)
}

#[tokio::test]
async fn five_concurrent_acquires_admit_exactly_three() {
    let provider = provider();
    let handles: Vec<Semaphore> =
        (0..5).map(|_| provider.create("pool", 3).unwrap()).collect();

    let mut tasks = Vec::new();
    for handle in handles.iter().cloned() {
        tasks.push(tokio::spawn(async move {
            let acquired = handle.acquire().await.unwrap();
            (handle, acquired)
        }));
    }

    let mut admitted = Vec::new();
    let mut rejected = Vec::new();
    for task in tasks {
        let (handle, acquired) = task.await.unwrap();
        if acquired {
            admitted.push(handle);
        } else {
            rejected.push(handle);
        }
    }
    assert_eq!(admitted.len(), 3);
    assert_eq!(rejected.len(), 2);

    // Releasing one slot admits exactly one more.
    assert!(admitted.pop().unwrap().release().await.unwrap());
    assert!(rejected[0].acquire().await.unwrap());
    assert!(!rejected[1].acquire().await.unwrap());
}

#[tokio::test]
async fn slot_ttls_expire_independently() {
    let provider = provider();
    let short = provider.create("pool", 2).unwrap().ttl(TimeSpan::from_millis(100));
    let long = provider.create("pool", 2).unwrap().ttl(TimeSpan::from_secs(10));

    assert!(short.acquire().await.unwrap());
    assert!(long.acquire().await.unwrap());

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    assert_eq!(short.get_state().await.unwrap(), SemaphoreState::Expired);
    assert_eq!(long.get_state().await.unwrap(), SemaphoreState::Acquired);

    // The expired slot's capacity is reusable.
    let third = provider.create("pool", 2).unwrap();
    assert!(third.acquire().await.unwrap());
}

#[tokio::test]
async fn limits_are_immutable_while_the_record_lives() {
    let provider = provider();
    let a = provider.create("pool", 3).unwrap();
    assert!(a.acquire().await.unwrap());

    let conflicting = provider.create("pool", 4).unwrap();
    assert!(conflicting.acquire().await.is_err());

    assert!(a.release().await.unwrap());
    assert!(conflicting.acquire().await.unwrap(), "a fresh record adopts the new limit");
}
