// Integration tests for the single-flight resolution cache.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use rudder::{
    core::{resolver::ResolveError, Endpoint, ResolverCache, ServiceKey},
    ports::catalog::{Catalog, CatalogError, CatalogResult},
};

/// Catalog stub that answers after a fixed delay and counts lookups.
struct SlowCatalog {
    lookups: AtomicUsize,
    delay: Duration,
    endpoints: Vec<Endpoint>,
}

#[async_trait]
impl Catalog for SlowCatalog {
    async fn lookup(&self, _key: &ServiceKey) -> CatalogResult<Vec<Endpoint>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.endpoints.clone())
    }
}

/// Catalog stub that plays back a scripted sequence of answers; once the
/// script runs dry every further lookup fails.
struct ScriptedCatalog {
    lookups: AtomicUsize,
    script: Mutex<VecDeque<CatalogResult<Vec<Endpoint>>>>,
}

impl ScriptedCatalog {
    fn new(script: Vec<CatalogResult<Vec<Endpoint>>>) -> Arc<Self> {
        Arc::new(Self {
            lookups: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
        })
    }
}

#[async_trait]
impl Catalog for ScriptedCatalog {
    async fn lookup(&self, _key: &ServiceKey) -> CatalogResult<Vec<Endpoint>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(CatalogError::Unavailable("script exhausted".to_string())))
    }
}

fn endpoint_a() -> Endpoint {
    Endpoint::new("10.0.0.7", 8001)
}

fn endpoint_b() -> Endpoint {
    Endpoint::new("10.0.0.8", 8002)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_misses_coalesce_into_one_lookup() {
    let catalog = Arc::new(SlowCatalog {
        lookups: AtomicUsize::new(0),
        delay: Duration::from_millis(200),
        endpoints: vec![endpoint_a()],
    });
    let cache = ResolverCache::new(catalog.clone(), Duration::from_secs(10));
    let key = ServiceKey::new("api", "");

    let mut handles = Vec::new();
    for _ in 0..50 {
        let cache = cache.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move { cache.resolve(&key).await }));
    }

    for handle in handles {
        let endpoints = handle.await.expect("task").expect("resolve");
        assert_eq!(endpoints, vec![endpoint_a()]);
    }

    assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fresh_results_are_served_within_ttl() {
    let catalog = ScriptedCatalog::new(vec![Ok(vec![endpoint_a()]), Ok(vec![endpoint_b()])]);
    let cache = ResolverCache::new(catalog.clone(), Duration::from_secs(10));
    let key = ServiceKey::new("api", "");

    assert_eq!(cache.resolve(&key).await.expect("resolve"), vec![endpoint_a()]);
    assert_eq!(cache.resolve(&key).await.expect("resolve"), vec![endpoint_a()]);
    assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_entries_are_refreshed() {
    let catalog = ScriptedCatalog::new(vec![Ok(vec![endpoint_a()]), Ok(vec![endpoint_b()])]);
    let cache = ResolverCache::new(catalog.clone(), Duration::from_millis(50));
    let key = ServiceKey::new("api", "");

    assert_eq!(cache.resolve(&key).await.expect("resolve"), vec![endpoint_a()]);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(cache.resolve(&key).await.expect("resolve"), vec![endpoint_b()]);
    assert_eq!(catalog.lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_endpoint_sets_are_cached_until_expiry() {
    let catalog = ScriptedCatalog::new(vec![Ok(vec![]), Ok(vec![endpoint_a()])]);
    let cache = ResolverCache::new(catalog.clone(), Duration::from_millis(100));
    let key = ServiceKey::new("api", "");

    // "No healthy endpoints" is an authoritative answer, not a miss.
    assert_eq!(cache.resolve(&key).await.expect("resolve"), vec![]);
    assert_eq!(cache.resolve(&key).await.expect("resolve"), vec![]);
    assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.resolve(&key).await.expect("resolve"), vec![endpoint_a()]);
    assert_eq!(catalog.lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stale_endpoints_are_served_when_refresh_fails() {
    let catalog = ScriptedCatalog::new(vec![
        Ok(vec![endpoint_a()]),
        Err(CatalogError::Unavailable("agent down".to_string())),
        Err(CatalogError::Unavailable("agent down".to_string())),
    ]);
    let cache = ResolverCache::new(catalog.clone(), Duration::from_millis(50));
    let key = ServiceKey::new("api", "");

    assert_eq!(cache.resolve(&key).await.expect("resolve"), vec![endpoint_a()]);
    tokio::time::sleep(Duration::from_millis(80)).await;

    // Refresh fails: the stale answer is served and the entry stays expired,
    // so the next call retries instead of being blocked by a negative entry.
    assert_eq!(cache.resolve(&key).await.expect("stale"), vec![endpoint_a()]);
    assert_eq!(catalog.lookups.load(Ordering::SeqCst), 2);

    assert_eq!(cache.resolve(&key).await.expect("stale"), vec![endpoint_a()]);
    assert_eq!(catalog.lookups.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_errors_without_prior_results_are_not_cached() {
    let catalog = ScriptedCatalog::new(vec![
        Err(CatalogError::Unavailable("agent down".to_string())),
        Ok(vec![endpoint_a()]),
    ]);
    let cache = ResolverCache::new(catalog.clone(), Duration::from_secs(10));
    let key = ServiceKey::new("api", "");

    match cache.resolve(&key).await {
        Err(ResolveError::Unavailable(_)) => {}
        other => panic!("expected unavailable error, got {other:?}"),
    }

    // The failure left no entry behind; the next caller queries again.
    assert_eq!(cache.resolve(&key).await.expect("resolve"), vec![endpoint_a()]);
    assert_eq!(catalog.lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_waiter_cancellation_does_not_cancel_the_refresh() {
    let catalog = Arc::new(SlowCatalog {
        lookups: AtomicUsize::new(0),
        delay: Duration::from_millis(100),
        endpoints: vec![endpoint_a()],
    });
    let cache = ResolverCache::new(catalog.clone(), Duration::from_secs(10));
    let key = ServiceKey::new("api", "");

    // Start a resolve and drop it mid-flight.
    let doomed = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move { cache.resolve(&key).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    doomed.abort();

    // The detached refresh completes and later callers reuse its result.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.resolve(&key).await.expect("resolve"), vec![endpoint_a()]);
    assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);
}
