use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the resolution substrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Release identifier baked into every cache key, so each deploy gets a
    /// fresh cache namespace without manual invalidation.
    pub release_version: String,
    pub dataset: DatasetConfig,
    pub queue: QueueConfig,
    pub ttl: TtlConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            release_version: std::env::var("IDLINK_RELEASE")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            dataset: DatasetConfig::default(),
            queue: QueueConfig::default(),
            ttl: TtlConfig::default(),
        }
    }
}

/// Where the precomputed cross-reference dataset lives and where its
/// on-disk snapshot is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub url: String,
    pub snapshot_path: PathBuf,
    pub marker_path: PathBuf,
    /// Client-side timeout for the refresh request. A timeout counts as a
    /// load failure and falls back to the snapshot.
    pub request_timeout: Duration,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            url: "https://raw.githubusercontent.com/Fribb/anime-lists/master/anime-list-full.json"
                .to_string(),
            snapshot_path: PathBuf::from("data/anime-list.json"),
            marker_path: PathBuf::from("data/anime-list.etag"),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Pacing and retry policy for the rate-limited serial queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Minimum delay between two consecutive requests.
    pub min_interval: Duration,
    /// Base duration for exponential backoff after a rate-limit response.
    pub backoff_base: Duration,
    /// Ceiling for a single backoff sleep.
    pub max_backoff: Duration,
    /// Maximum number of attempts per task before it is rejected.
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(350),
            backoff_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

/// TTL policy per cache namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    /// Merged metadata records.
    pub meta: Duration,
    /// Catalog pages.
    pub catalog: Duration,
    /// Long-lived historical catalogs that effectively never change.
    pub static_catalog: Duration,
    /// Raw upstream API responses, per provider.
    pub provider_response: Duration,
    /// Long-term persisted cross-reference mappings.
    pub id_mapping: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            meta: Duration::from_secs(24 * 3600),
            catalog: Duration::from_secs(3600),
            static_catalog: Duration::from_secs(7 * 24 * 3600),
            provider_response: Duration::from_secs(12 * 3600),
            id_mapping: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

/// Per-call options threaded through the resolver by its callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Skip cache reads (writes still happen) for this resolution.
    pub bypass_cache: bool,
}
