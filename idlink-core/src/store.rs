use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use idlink_model::ExternalIdentity;
use tracing::{debug, warn};

use crate::backend::CacheBackend;

/// Long-term persisted cross-reference cache: one merged identity stored
/// under every id it is known by.
///
/// Keys are deliberately *not* release-versioned: mappings between provider
/// ids outlive deploys. Used only for non-anime content; anime identity is
/// already covered by the static mapping table.
#[derive(Clone)]
pub struct IdentityStore {
    backend: Option<Arc<dyn CacheBackend>>,
    ttl: Duration,
}

impl fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityStore")
            .field("enabled", &self.backend.is_some())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl IdentityStore {
    pub fn new(backend: Option<Arc<dyn CacheBackend>>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    fn keys(identity: &ExternalIdentity) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(ref id) = identity.imdb_id {
            keys.push(format!("idmap:imdb:{id}"));
        }
        if let Some(id) = identity.tmdb_id {
            keys.push(format!("idmap:tmdb:{id}"));
        }
        if let Some(id) = identity.tvdb_id {
            keys.push(format!("idmap:tvdb:{id}"));
        }
        if let Some(id) = identity.tvmaze_id {
            keys.push(format!("idmap:tvmaze:{id}"));
        }
        keys
    }

    /// Look up a previously persisted mapping by any of the ids already
    /// known. Backend failures and malformed payloads degrade to `None`.
    pub async fn find(
        &self,
        identity: &ExternalIdentity,
    ) -> Option<ExternalIdentity> {
        let backend = self.backend.as_ref()?;

        for key in Self::keys(identity) {
            match backend.get(&key).await {
                Ok(Some(raw)) => match serde_json::from_str(&raw) {
                    Ok(found) => {
                        debug!("persisted id mapping hit: {}", key);
                        return Some(found);
                    }
                    Err(err) => warn!(
                        "discarding malformed persisted mapping at {}: {}",
                        key, err
                    ),
                },
                Ok(None) => {}
                Err(err) => {
                    warn!("identity store read failed for {}: {}", key, err);
                    return None;
                }
            }
        }

        None
    }

    /// Persist a merged identity under every id it carries. Fire-and-forget
    /// semantics: failures are logged, never surfaced.
    pub async fn save(&self, identity: &ExternalIdentity) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };

        let raw = match serde_json::to_string(identity) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("could not serialize identity for persistence: {}", err);
                return;
            }
        };

        for key in Self::keys(identity) {
            if let Err(err) = backend.set(&key, &raw, self.ttl).await {
                warn!("identity store write failed for {}: {}", key, err);
            }
        }
    }
}
