//! Shared fixtures for the integration tests: hand-rolled provider mocks
//! with call counters, a counting cache backend, and resolver assembly.
#![allow(dead_code)]

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use idlink_core::backend::{CacheBackend, MemoryBackend};
use idlink_core::error::{ResolveError, Result};
use idlink_core::providers::{
    AggregatedIds, ImdbAggregator, KitsuBridge, KitsuDetails, Providers,
    TmdbBridge, TmdbExternalIds, TvdbBridge, TvdbRemoteIds, TvmazeBridge,
    TvmazeExternals,
};
use idlink_core::{
    CacheManager, IdentityStore, MappingTable, QueueConfig, Resolver,
    SerialQueue, TtlConfig,
};
use idlink_model::{ContentKind, StaticMappingEntry};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route substrate logs into the test harness; honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

fn offline() -> ResolveError {
    ResolveError::Network("network unavailable".to_string())
}

/// A provider that is down: every call fails with a network error.
pub struct Offline;

#[async_trait]
impl TmdbBridge for Offline {
    async fn external_ids(
        &self,
        _tmdb_id: u64,
        _kind: ContentKind,
    ) -> Result<TmdbExternalIds> {
        Err(offline())
    }

    async fn find_by_imdb(
        &self,
        _imdb_id: &str,
        _kind: ContentKind,
    ) -> Result<Option<u64>> {
        Err(offline())
    }
}

#[async_trait]
impl TvdbBridge for Offline {
    async fn extended_remote_ids(
        &self,
        _tvdb_id: u64,
        _kind: ContentKind,
    ) -> Result<TvdbRemoteIds> {
        Err(offline())
    }

    async fn find_by_remote_id(
        &self,
        _imdb_id: &str,
        _kind: ContentKind,
    ) -> Result<Option<u64>> {
        Err(offline())
    }
}

#[async_trait]
impl TvmazeBridge for Offline {
    async fn lookup_by_imdb(&self, _imdb_id: &str) -> Result<Option<u64>> {
        Err(offline())
    }

    async fn show_externals(&self, _tvmaze_id: u64) -> Result<TvmazeExternals> {
        Err(offline())
    }
}

#[async_trait]
impl KitsuBridge for Offline {
    async fn details(&self, _kitsu_ids: &[u64]) -> Result<Vec<KitsuDetails>> {
        Err(offline())
    }
}

#[async_trait]
impl ImdbAggregator for Offline {
    async fn lookup(&self, _imdb_id: &str) -> Result<AggregatedIds> {
        Err(offline())
    }
}

/// Aggregator answering every lookup with one canned id pair.
#[derive(Default)]
pub struct MockAggregator {
    pub ids: AggregatedIds,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ImdbAggregator for MockAggregator {
    async fn lookup(&self, _imdb_id: &str) -> Result<AggregatedIds> {
        self.calls.fetch_add(1, SeqCst);
        Ok(self.ids.clone())
    }
}

/// TMDB bridge answering with canned external ids / find results.
#[derive(Default)]
pub struct MockTmdb {
    pub external: TmdbExternalIds,
    pub find: Option<u64>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TmdbBridge for MockTmdb {
    async fn external_ids(
        &self,
        _tmdb_id: u64,
        _kind: ContentKind,
    ) -> Result<TmdbExternalIds> {
        self.calls.fetch_add(1, SeqCst);
        Ok(self.external.clone())
    }

    async fn find_by_imdb(
        &self,
        _imdb_id: &str,
        _kind: ContentKind,
    ) -> Result<Option<u64>> {
        self.calls.fetch_add(1, SeqCst);
        Ok(self.find)
    }
}

/// Kitsu bridge serving canned detail records, filtered to the ids asked
/// for, counting batch calls.
#[derive(Default)]
pub struct MockKitsu {
    pub records: Vec<KitsuDetails>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl KitsuBridge for MockKitsu {
    async fn details(&self, kitsu_ids: &[u64]) -> Result<Vec<KitsuDetails>> {
        self.calls.fetch_add(1, SeqCst);
        Ok(self
            .records
            .iter()
            .filter(|record| kitsu_ids.contains(&record.kitsu_id))
            .cloned()
            .collect())
    }
}

/// Backend wrapper counting reads and writes.
#[derive(Default)]
pub struct CountingBackend {
    pub inner: MemoryBackend,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
}

#[async_trait]
impl CacheBackend for CountingBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.gets.fetch_add(1, SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.sets.fetch_add(1, SeqCst);
        self.inner.set(key, value, ttl).await
    }
}

/// All providers offline.
pub fn offline_providers() -> Providers {
    Providers {
        tmdb: Arc::new(Offline),
        tvdb: Arc::new(Offline),
        tvmaze: Arc::new(Offline),
        kitsu: Arc::new(Offline),
        imdb_aggregator: Arc::new(Offline),
    }
}

/// Queue tuned so paused-clock tests run instantly.
pub fn test_queue() -> Arc<SerialQueue> {
    init_tracing();
    Arc::new(SerialQueue::new(QueueConfig {
        min_interval: Duration::from_millis(1),
        backoff_base: Duration::from_millis(2),
        max_backoff: Duration::from_millis(20),
        max_retries: 3,
    }))
}

/// Assemble a resolver over a pre-seeded static table.
pub fn resolver_with(
    entries: Vec<StaticMappingEntry>,
    providers: Providers,
    backend: Option<Arc<dyn CacheBackend>>,
) -> Resolver {
    init_tracing();
    let mappings = Arc::new(MappingTable::with_entries(entries));
    let cache = Arc::new(CacheManager::new(
        backend.clone(),
        "test",
        TtlConfig::default(),
    ));
    let store = IdentityStore::new(backend, Duration::from_secs(3600));
    Resolver::new(mappings, cache, store, test_queue(), providers)
}
