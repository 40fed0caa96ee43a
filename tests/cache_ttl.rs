use lockstep::{
    CacheAdapter, CacheError, CacheProvider, DatabaseCacheAdapter, ManualClock, MemoryCacheAdapter,
    MemoryDatabaseCacheAdapter, Namespace, TimeSpan, Timestamp,
};
use std::sync::Arc;
use std::time::Duration;

fn direct() -> (ManualClock, CacheProvider) {
    let clock = ManualClock::new(Timestamp::from_unix_millis(1_000));
    let adapter =
        Arc::new(MemoryCacheAdapter::new(Arc::new(clock.clone()))) as Arc<dyn CacheAdapter>;
    let provider =
        CacheProvider::with_clock(adapter, Namespace::new("it").unwrap(), Arc::new(clock.clone()));
    (clock, provider)
}

fn derived() -> (ManualClock, CacheProvider) {
    let clock = ManualClock::new(Timestamp::from_unix_millis(1_000));
    let adapter = Arc::new(MemoryDatabaseCacheAdapter::new()) as Arc<dyn DatabaseCacheAdapter>;
    let provider =
        CacheProvider::with_clock(adapter, Namespace::new("it").unwrap(), Arc::new(clock.clone()));
    (clock, provider)
}

async fn ttl_and_type_check(clock: ManualClock, cache: CacheProvider) {
    assert!(cache.add("n", &1, Some(TimeSpan::from_secs(1))).await.unwrap());
    assert!(cache.increment("n", 2.0).await.unwrap());
    assert_eq!(cache.get::<i64>("n").await.unwrap(), Some(3));

    clock.advance_millis(1_100);
    assert_eq!(cache.get::<i64>("n").await.unwrap(), None, "TTL elapsed");

    assert!(cache.add("s", &"x", None).await.unwrap(), "unexpirable entry");
    assert!(matches!(cache.increment("s", 1.0).await, Err(CacheError::Type { .. })));
    clock.advance_millis(10_000_000);
    assert_eq!(cache.get::<String>("s").await.unwrap().as_deref(), Some("x"));
}

#[tokio::test]
async fn ttl_and_type_check_direct_adapter() {
    let (clock, cache) = direct();
    ttl_and_type_check(clock, cache).await;
}

#[tokio::test]
async fn ttl_and_type_check_derived_database_adapter() {
    let (clock, cache) = derived();
    ttl_and_type_check(clock, cache).await;
}

#[tokio::test]
async fn the_two_adapter_families_agree_on_semantics() {
    let (direct_clock, direct_cache) = direct();
    let (derived_clock, derived_cache) = derived();

    for (clock, cache) in [(direct_clock, direct_cache), (derived_clock, derived_cache)] {
        assert!(!cache.put("k", &"v1", Some(TimeSpan::from_secs(1))).await.unwrap());
        assert!(cache.put("k", &"v2", Some(TimeSpan::from_secs(1))).await.unwrap());
        assert!(cache.update("k", &"v3").await.unwrap());

        clock.advance_millis(1_100);
        assert!(!cache.update("k", &"v4").await.unwrap());
        assert!(!cache.put("k", &"v5", None).await.unwrap(), "expired replace is an insert");
        assert!(!cache.remove("missing").await.unwrap());
        assert!(cache.remove("k").await.unwrap());
    }
}

#[tokio::test]
async fn sweeper_physically_deletes_but_semantics_never_depend_on_it() {
    let clock = ManualClock::new(Timestamp::from_unix_millis(0));
    let adapter = Arc::new(MemoryCacheAdapter::new(Arc::new(clock.clone())));
    let cache = CacheProvider::with_clock(
        Arc::clone(&adapter) as Arc<dyn CacheAdapter>,
        Namespace::new("it").unwrap(),
        Arc::new(clock.clone()),
    );

    assert!(cache.add("gone", &1, Some(TimeSpan::from_millis(10))).await.unwrap());
    clock.advance_millis(20);
    // Logically absent before any sweep runs.
    assert_eq!(cache.get::<i64>("gone").await.unwrap(), None);

    cache.start_sweeper(TimeSpan::from_millis(20));
    tokio::time::sleep(Duration::from_millis(80)).await;
    cache.stop_sweeper();

    assert_eq!(adapter.remove_expired().await.unwrap(), 0, "the sweeper already deleted it");
}
