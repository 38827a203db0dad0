mod support;

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;
use std::time::Duration;

use idlink_core::backend::{CacheBackend, MemoryBackend};
use idlink_core::{CacheManager, ResolveError, TtlConfig};
use support::CountingBackend;

const TTL: Duration = Duration::from_secs(60);

fn manager(backend: Arc<dyn CacheBackend>) -> CacheManager {
    support::init_tracing();
    CacheManager::new(Some(backend), "test", TtlConfig::default())
}

#[tokio::test(start_paused = true)]
async fn concurrent_same_key_calls_share_one_producer() {
    let cache = manager(Arc::new(MemoryBackend::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let producer = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Some(42u32))
        }
    };

    let (a, b) = tokio::join!(
        cache.wrap("answer", TTL, false, producer(Arc::clone(&calls))),
        cache.wrap("answer", TTL, false, producer(Arc::clone(&calls))),
    );

    assert_eq!(a.unwrap(), Some(42));
    assert_eq!(b.unwrap(), Some(42));
    assert_eq!(calls.load(SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cached_value_is_served_until_the_ttl_expires() {
    let cache = manager(Arc::new(MemoryBackend::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let producer = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, SeqCst);
            Ok(Some(7u32))
        }
    };

    for _ in 0..2 {
        let got = cache
            .wrap("k", TTL, false, producer(Arc::clone(&calls)))
            .await
            .unwrap();
        assert_eq!(got, Some(7));
    }
    assert_eq!(calls.load(SeqCst), 1);

    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    let got = cache
        .wrap("k", TTL, false, producer(Arc::clone(&calls)))
        .await
        .unwrap();
    assert_eq!(got, Some(7));
    assert_eq!(calls.load(SeqCst), 2);
}

#[tokio::test]
async fn empty_results_are_never_persisted() {
    let backend = Arc::new(CountingBackend::default());
    let cache = manager(Arc::clone(&backend) as Arc<dyn CacheBackend>);
    let calls = Arc::new(AtomicUsize::new(0));

    let producer = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, SeqCst);
            Ok(None::<u32>)
        }
    };

    let got = cache
        .wrap("missing", TTL, false, producer(Arc::clone(&calls)))
        .await
        .unwrap();
    assert_eq!(got, None);
    assert_eq!(backend.sets.load(SeqCst), 0);

    // An absent value is not a cached value; the next call asks again.
    let got = cache
        .wrap("missing", TTL, false, producer(Arc::clone(&calls)))
        .await
        .unwrap();
    assert_eq!(got, None);
    assert_eq!(calls.load(SeqCst), 2);
}

#[tokio::test]
async fn producer_failure_propagates_and_is_not_cached() {
    let backend = Arc::new(CountingBackend::default());
    let cache = manager(Arc::clone(&backend) as Arc<dyn CacheBackend>);

    let err = cache
        .wrap::<u32, _, _>("flaky", TTL, false, || async {
            Err(ResolveError::NotFound)
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Shared(ref inner) if matches!(**inner, ResolveError::NotFound)
    ));
    assert_eq!(backend.sets.load(SeqCst), 0);

    let got = cache
        .wrap("flaky", TTL, false, || async { Ok(Some(9u32)) })
        .await
        .unwrap();
    assert_eq!(got, Some(9));
    assert_eq!(backend.sets.load(SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_awaiters_all_observe_the_failure() {
    let cache = manager(Arc::new(MemoryBackend::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    let producer = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<Option<u32>, _>(ResolveError::RateLimited)
        }
    };

    let (a, b) = tokio::join!(
        cache.wrap("down", TTL, false, producer(Arc::clone(&calls))),
        cache.wrap("down", TTL, false, producer(Arc::clone(&calls))),
    );

    assert!(a.is_err());
    assert!(b.is_err());
    assert_eq!(calls.load(SeqCst), 1);
}

#[tokio::test]
async fn disabled_manager_always_runs_the_producer() {
    let cache = CacheManager::disabled();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        let got = cache
            .wrap("k", TTL, false, move || async move {
                calls.fetch_add(1, SeqCst);
                Ok(Some(1u32))
            })
            .await
            .unwrap();
        assert_eq!(got, Some(1));
    }

    assert_eq!(calls.load(SeqCst), 2);
}

#[tokio::test]
async fn bypass_skips_the_read_but_still_writes() {
    let cache = manager(Arc::new(MemoryBackend::new()));

    let got = cache
        .wrap("b", TTL, false, || async { Ok(Some(1u32)) })
        .await
        .unwrap();
    assert_eq!(got, Some(1));

    // Bypass ignores the cached 1 and overwrites it.
    let got = cache
        .wrap("b", TTL, true, || async { Ok(Some(2u32)) })
        .await
        .unwrap();
    assert_eq!(got, Some(2));

    let calls = Arc::new(AtomicUsize::new(0));
    let probe = Arc::clone(&calls);
    let got = cache
        .wrap("b", TTL, false, move || async move {
            probe.fetch_add(1, SeqCst);
            Ok(Some(3u32))
        })
        .await
        .unwrap();
    assert_eq!(got, Some(2));
    assert_eq!(calls.load(SeqCst), 0);
}

#[tokio::test]
async fn keys_are_namespaced_by_release_version() {
    let backend = Arc::new(MemoryBackend::new());
    let old = manager(Arc::clone(&backend) as Arc<dyn CacheBackend>);
    let new = CacheManager::new(
        Some(Arc::clone(&backend) as Arc<dyn CacheBackend>),
        "test-next",
        TtlConfig::default(),
    );

    let got = old
        .wrap("k", TTL, false, || async { Ok(Some(1u32)) })
        .await
        .unwrap();
    assert_eq!(got, Some(1));

    // A new release sees a cold cache for the same logical key.
    let got = new
        .wrap("k", TTL, false, || async { Ok(Some(2u32)) })
        .await
        .unwrap();
    assert_eq!(got, Some(2));
    assert_eq!(backend.len(), 2);
}
