use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::time::Instant;
use tracing::info;

use crate::error::{ResolveError, Result};

/// Key-value backend consumed by the cache primitive and the long-term
/// identity store. Implementations must treat `ttl` as an upper bound on
/// entry lifetime.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

/// Redis-backed implementation used in deployments.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisBackend {
    pub async fn new(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis cache at {}", redis_url);

        let client = redis::Client::open(redis_url).map_err(|e| {
            ResolveError::Backend(format!("failed to create Redis client: {e}"))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            ResolveError::Backend(format!("failed to connect to Redis: {e}"))
        })?;

        info!("Successfully connected to Redis cache");

        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| ResolveError::Backend(format!("Redis GET failed: {e}")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .map_err(|e| {
                ResolveError::Backend(format!("Redis SETEX failed: {e}"))
            })
    }
}

/// In-process backend for tests and deployments without Redis. Expiry is
/// checked lazily on read against the tokio clock, so paused-time tests
/// observe TTLs deterministically.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .expect("memory backend lock poisoned")
            .values()
            .filter(|(_, deadline)| *deadline > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self
            .entries
            .lock()
            .expect("memory backend lock poisoned");
        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => {
                Ok(Some(value.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .expect("memory backend lock poisoned")
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}
