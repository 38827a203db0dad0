use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::CacheBackend;
use crate::config::TtlConfig;
use crate::error::{ResolveError, Result};

/// The outcome every awaiter of one in-flight producer observes.
type InFlightOutcome = std::result::Result<Option<Value>, Arc<ResolveError>>;

type InFlight = Shared<BoxFuture<'static, InFlightOutcome>>;

/// Versioned, stampede-safe cache-aside primitive.
///
/// Every key is namespaced by the release version, so a deploy invalidates
/// the whole cache without manual sweeps. Within one process, at most one
/// producer runs per versioned key at a time; concurrent callers await the
/// same in-flight result. Backend read/write failures are logged and
/// swallowed; producer failures propagate to every awaiter and are never
/// cached.
pub struct CacheManager {
    backend: Option<Arc<dyn CacheBackend>>,
    in_flight: Arc<DashMap<String, InFlight>>,
    release_version: String,
    ttl: TtlConfig,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("enabled", &self.backend.is_some())
            .field("release_version", &self.release_version)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl CacheManager {
    pub fn new(
        backend: Option<Arc<dyn CacheBackend>>,
        release_version: impl Into<String>,
        ttl: TtlConfig,
    ) -> Self {
        Self {
            backend,
            in_flight: Arc::new(DashMap::new()),
            release_version: release_version.into(),
            ttl,
        }
    }

    /// A manager with no backend: producers always run directly, nothing is
    /// deduplicated or cached.
    pub fn disabled() -> Self {
        Self::new(None, env!("CARGO_PKG_VERSION"), TtlConfig::default())
    }

    fn versioned_key(&self, key: &str) -> String {
        format!("v{}:{}", self.release_version, key)
    }

    /// Cache-aside call: read `key`, or run `producer` (once per key per
    /// process) and cache its non-`None` result for `ttl`.
    ///
    /// With `bypass` the read is skipped; dedup and the write still apply.
    pub async fn wrap<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        bypass: bool,
        producer: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let Some(backend) = self.backend.clone() else {
            return producer().await;
        };

        let versioned = self.versioned_key(key);

        if !bypass {
            match backend.get(&versioned).await {
                Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                    Ok(value) => {
                        debug!("Cache HIT: {}", versioned);
                        return Ok(Some(value));
                    }
                    // Malformed payloads are a miss, not an error.
                    Err(err) => warn!(
                        "discarding malformed cache payload for {}: {}",
                        versioned, err
                    ),
                },
                Ok(None) => debug!("Cache MISS: {}", versioned),
                Err(err) => {
                    warn!("cache read failed for {}: {}", versioned, err)
                }
            }
        }

        let shared = match self.in_flight.entry(versioned.clone()) {
            Entry::Occupied(entry) => {
                debug!("joining in-flight producer for {}", versioned);
                entry.get().clone()
            }
            Entry::Vacant(slot) => {
                let in_flight = Arc::clone(&self.in_flight);
                let key = versioned.clone();
                let fut = producer();
                let task = async move {
                    let outcome = produce_and_store(fut, backend, &key, ttl).await;
                    in_flight.remove(&key);
                    outcome
                }
                .boxed()
                .shared();
                slot.insert(task.clone());
                task
            }
        };

        match shared.await {
            Ok(Some(json)) => Ok(Some(serde_json::from_value(json)?)),
            Ok(None) => Ok(None),
            Err(err) => Err(ResolveError::Shared(err)),
        }
    }

    /// Merged metadata records.
    pub async fn wrap_meta<T, F, Fut>(
        &self,
        key: &str,
        bypass: bool,
        producer: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        self.wrap(&format!("meta:{key}"), self.ttl.meta, bypass, producer)
            .await
    }

    /// Catalog pages.
    pub async fn wrap_catalog<T, F, Fut>(
        &self,
        key: &str,
        bypass: bool,
        producer: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        self.wrap(
            &format!("catalog:{key}"),
            self.ttl.catalog,
            bypass,
            producer,
        )
        .await
    }

    /// Historical catalogs that effectively never change.
    pub async fn wrap_static_catalog<T, F, Fut>(
        &self,
        key: &str,
        bypass: bool,
        producer: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        self.wrap(
            &format!("catalog:static:{key}"),
            self.ttl.static_catalog,
            bypass,
            producer,
        )
        .await
    }

    /// Raw upstream API responses, namespaced per provider.
    pub async fn wrap_provider<T, F, Fut>(
        &self,
        provider: &str,
        key: &str,
        bypass: bool,
        producer: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        self.wrap(
            &format!("api:{provider}:{key}"),
            self.ttl.provider_response,
            bypass,
            producer,
        )
        .await
    }
}

/// Run one producer, persist a non-`None` result, and shape the outcome for
/// sharing across awaiters. Write failures are logged, never raised.
async fn produce_and_store<T, Fut>(
    fut: Fut,
    backend: Arc<dyn CacheBackend>,
    key: &str,
    ttl: Duration,
) -> InFlightOutcome
where
    T: Serialize,
    Fut: Future<Output = Result<Option<T>>>,
{
    let produced = fut.await.map_err(Arc::new)?;

    let Some(value) = produced else {
        // Empty results are never persisted.
        return Ok(None);
    };

    let json = serde_json::to_value(&value)
        .map_err(|e| Arc::new(ResolveError::from(e)))?;

    if let Err(err) = backend.set(key, &json.to_string(), ttl).await {
        warn!("cache write failed for {}: {}", key, err);
    }

    Ok(Some(json))
}
