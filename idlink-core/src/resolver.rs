use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use idlink_model::{ContentKind, ExternalIdentity, ParsedId};
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::config::RequestOptions;
use crate::franchise::FranchiseSeasonMap;
use crate::mapping::MappingTable;
use crate::providers::{Providers, TvdbRemoteIds};
use crate::queue::SerialQueue;
use crate::store::IdentityStore;

/// Identity graph resolver: merges static-table lookups with live bridging
/// calls into one [`ExternalIdentity`] per title.
///
/// Resolution of one id is a strictly forward pipeline: the seed, the
/// static merges, then up to four bridging stages in a fixed order. The
/// identity struct only ever accumulates fields. Every bridging sub-lookup
/// failure is logged and swallowed; partial results are always acceptable.
pub struct Resolver {
    pub(crate) mappings: Arc<MappingTable>,
    pub(crate) cache: Arc<CacheManager>,
    pub(crate) kitsu_queue: Arc<SerialQueue>,
    pub(crate) providers: Providers,
    store: IdentityStore,
    pub(crate) franchise_memo: DashMap<u64, Arc<FranchiseSeasonMap>>,
    pub(crate) imdb_season_memo: DashMap<u64, Option<u32>>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("mappings", &self.mappings)
            .field("cache", &self.cache)
            .field("franchise_memo", &self.franchise_memo.len())
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(
        mappings: Arc<MappingTable>,
        cache: Arc<CacheManager>,
        store: IdentityStore,
        kitsu_queue: Arc<SerialQueue>,
        providers: Providers,
    ) -> Self {
        Self {
            mappings,
            cache,
            kitsu_queue,
            providers,
            store,
            franchise_memo: DashMap::new(),
            imdb_season_memo: DashMap::new(),
        }
    }

    /// Load the static mapping table if it has not been loaded yet.
    pub async fn initialize(&self) {
        self.mappings.initialize().await;
    }

    /// Drop all derived memo caches. They are pure derivations of the static
    /// table plus provider data and rebuild on demand.
    pub fn reset(&self) {
        self.franchise_memo.clear();
        self.imdb_season_memo.clear();
    }

    /// Resolve every provider id reachable from one known id.
    ///
    /// Never fails: an unparseable seed, a cold static table, and total
    /// network failure all degrade to a mostly-empty identity.
    pub async fn resolve_all_ids(
        &self,
        known_id: &str,
        kind: ContentKind,
        opts: &RequestOptions,
        prefetched: Option<&ExternalIdentity>,
    ) -> ExternalIdentity {
        let mut identity = match known_id.parse::<ParsedId>() {
            Ok(id) => ExternalIdentity::seeded(&id),
            Err(err) => {
                warn!("cannot seed resolution from {:?}: {}", known_id, err);
                ExternalIdentity::default()
            }
        };
        if let Some(prefetched) = prefetched {
            identity.fill_from(prefetched);
        }

        let anime = kind == ContentKind::Anime || identity.has_anime_ids();

        if !anime {
            if let Some(found) = self.store.find(&identity).await {
                identity.fill_from(&found);
            }
            if identity.has_general_ids() {
                return identity;
            }
        }

        self.merge_static(&mut identity);

        self.bridge_tmdb(&mut identity, kind, opts).await;
        self.bridge_imdb(&mut identity, kind, opts).await;
        self.bridge_tvdb(&mut identity, kind, opts).await;
        self.bridge_tvmaze(&mut identity, opts).await;

        if !anime && !identity.is_empty() {
            // Fire-and-forget persist; anime identity is already covered by
            // the static table.
            let store = self.store.clone();
            let merged = identity.clone();
            tokio::spawn(async move { store.save(&merged).await });
        }

        identity
    }

    /// Static-table merges in fixed order: mal, kitsu, anidb, anilist. Each
    /// lookup fills only still-missing fields, and earlier merges can unlock
    /// later ones.
    fn merge_static(&self, identity: &mut ExternalIdentity) {
        let index = self.mappings.snapshot();

        if let Some(id) = identity.mal_id
            && let Some(entry) = index.by_mal(id)
        {
            identity.fill_from(&entry.to_identity());
        }
        if let Some(id) = identity.kitsu_id
            && let Some(entry) = index.by_kitsu(id)
        {
            identity.fill_from(&entry.to_identity());
        }
        if let Some(id) = identity.anidb_id
            && let Some(entry) = index.by_anidb(id)
        {
            identity.fill_from(&entry.to_identity());
        }
        if let Some(id) = identity.anilist_id
            && let Some(entry) = index.by_anilist(id)
        {
            identity.fill_from(&entry.to_identity());
        }
    }

    /// Stage a: tmdb id known. Details-with-external-ids yields imdb and
    /// tvdb; for series a freshly learned tvdb id is chased into the tvdb
    /// extended record for a tvmaze id.
    async fn bridge_tmdb(
        &self,
        identity: &mut ExternalIdentity,
        kind: ContentKind,
        opts: &RequestOptions,
    ) {
        let Some(tmdb_id) = identity.tmdb_id else {
            return;
        };

        if identity.imdb_id.is_none() || identity.tvdb_id.is_none() {
            let provider = Arc::clone(&self.providers.tmdb);
            let key = format!("external_ids:{kind}:{tmdb_id}");
            let result = self
                .cache
                .wrap_provider("tmdb", &key, opts.bypass_cache, move || {
                    async move {
                        provider.external_ids(tmdb_id, kind).await.map(Some)
                    }
                })
                .await;
            match result {
                Ok(Some(ids)) => identity.fill_from(&ExternalIdentity {
                    imdb_id: ids.imdb_id,
                    tvdb_id: ids.tvdb_id,
                    ..Default::default()
                }),
                Ok(None) => {}
                Err(err) => debug!(
                    "tmdb external-id bridge failed for tmdb:{}: {}",
                    tmdb_id, err
                ),
            }
        }

        if kind.is_series_like()
            && identity.tvmaze_id.is_none()
            && let Some(tvdb_id) = identity.tvdb_id
            && let Some(remote) = self.tvdb_remote_ids(tvdb_id, kind, opts).await
        {
            identity.fill_from(&ExternalIdentity {
                tvmaze_id: remote.tvmaze_id,
                ..Default::default()
            });
        }
    }

    /// Stage b: imdb id known. The third-party aggregator goes first, then
    /// provider find-by-external-id fills whatever is still missing.
    async fn bridge_imdb(
        &self,
        identity: &mut ExternalIdentity,
        kind: ContentKind,
        opts: &RequestOptions,
    ) {
        let Some(imdb_id) = identity.imdb_id.clone() else {
            return;
        };

        if identity.tmdb_id.is_none() || identity.tvdb_id.is_none() {
            let provider = Arc::clone(&self.providers.imdb_aggregator);
            let id = imdb_id.clone();
            let result = self
                .cache
                .wrap_provider(
                    "imdb-xref",
                    &format!("lookup:{imdb_id}"),
                    opts.bypass_cache,
                    move || async move { provider.lookup(&id).await.map(Some) },
                )
                .await;
            match result {
                Ok(Some(ids)) => identity.fill_from(&ExternalIdentity {
                    tmdb_id: ids.tmdb_id,
                    tvdb_id: ids.tvdb_id,
                    ..Default::default()
                }),
                Ok(None) => {}
                Err(err) => debug!(
                    "imdb aggregator bridge failed for {}: {}",
                    imdb_id, err
                ),
            }
        }

        if identity.tmdb_id.is_none() {
            let provider = Arc::clone(&self.providers.tmdb);
            let id = imdb_id.clone();
            let result = self
                .cache
                .wrap_provider(
                    "tmdb",
                    &format!("find:{kind}:{imdb_id}"),
                    opts.bypass_cache,
                    move || async move { provider.find_by_imdb(&id, kind).await },
                )
                .await;
            match result {
                Ok(found) => identity.fill_from(&ExternalIdentity {
                    tmdb_id: found,
                    ..Default::default()
                }),
                Err(err) => debug!(
                    "tmdb find-by-imdb bridge failed for {}: {}",
                    imdb_id, err
                ),
            }
        }

        if identity.tvdb_id.is_none() {
            let provider = Arc::clone(&self.providers.tvdb);
            let id = imdb_id.clone();
            let result = self
                .cache
                .wrap_provider(
                    "tvdb",
                    &format!("find:{kind}:{imdb_id}"),
                    opts.bypass_cache,
                    move || async move {
                        provider.find_by_remote_id(&id, kind).await
                    },
                )
                .await;
            match result {
                Ok(found) => identity.fill_from(&ExternalIdentity {
                    tvdb_id: found,
                    ..Default::default()
                }),
                Err(err) => debug!(
                    "tvdb find-by-remote-id bridge failed for {}: {}",
                    imdb_id, err
                ),
            }
        }

        if kind.is_series_like() && identity.tvmaze_id.is_none() {
            let provider = Arc::clone(&self.providers.tvmaze);
            let id = imdb_id.clone();
            let result = self
                .cache
                .wrap_provider(
                    "tvmaze",
                    &format!("lookup:{imdb_id}"),
                    opts.bypass_cache,
                    move || async move { provider.lookup_by_imdb(&id).await },
                )
                .await;
            match result {
                Ok(found) => identity.fill_from(&ExternalIdentity {
                    tvmaze_id: found,
                    ..Default::default()
                }),
                Err(err) => debug!(
                    "tvmaze lookup-by-imdb bridge failed for {}: {}",
                    imdb_id, err
                ),
            }
        }
    }

    /// Stage c: tvdb id known. The extended record's remote-id list carries
    /// imdb, tmdb, and tvmaze ids.
    async fn bridge_tvdb(
        &self,
        identity: &mut ExternalIdentity,
        kind: ContentKind,
        opts: &RequestOptions,
    ) {
        let Some(tvdb_id) = identity.tvdb_id else {
            return;
        };
        if identity.imdb_id.is_some()
            && identity.tmdb_id.is_some()
            && identity.tvmaze_id.is_some()
        {
            return;
        }

        if let Some(remote) = self.tvdb_remote_ids(tvdb_id, kind, opts).await {
            identity.fill_from(&ExternalIdentity {
                imdb_id: remote.imdb_id,
                tmdb_id: remote.tmdb_id,
                tvmaze_id: remote.tvmaze_id,
                ..Default::default()
            });
        }
    }

    /// Stage d: tvmaze id known. The show's externals object carries imdb,
    /// tvdb, and tmdb ids.
    async fn bridge_tvmaze(
        &self,
        identity: &mut ExternalIdentity,
        opts: &RequestOptions,
    ) {
        let Some(tvmaze_id) = identity.tvmaze_id else {
            return;
        };
        if identity.imdb_id.is_some()
            && identity.tmdb_id.is_some()
            && identity.tvdb_id.is_some()
        {
            return;
        }

        let provider = Arc::clone(&self.providers.tvmaze);
        let result = self
            .cache
            .wrap_provider(
                "tvmaze",
                &format!("show:{tvmaze_id}"),
                opts.bypass_cache,
                move || async move {
                    provider.show_externals(tvmaze_id).await.map(Some)
                },
            )
            .await;
        match result {
            Ok(Some(externals)) => identity.fill_from(&ExternalIdentity {
                imdb_id: externals.imdb_id,
                tvdb_id: externals.tvdb_id,
                tmdb_id: externals.tmdb_id,
                ..Default::default()
            }),
            Ok(None) => {}
            Err(err) => debug!(
                "tvmaze externals bridge failed for tvmaze:{}: {}",
                tvmaze_id, err
            ),
        }
    }

    /// Cached fetch of a TVDB extended record's remote ids; shared by
    /// stages a and c.
    async fn tvdb_remote_ids(
        &self,
        tvdb_id: u64,
        kind: ContentKind,
        opts: &RequestOptions,
    ) -> Option<TvdbRemoteIds> {
        let branch = if kind.is_series_like() { "series" } else { "movie" };
        let provider = Arc::clone(&self.providers.tvdb);
        let result = self
            .cache
            .wrap_provider(
                "tvdb",
                &format!("extended:{branch}:{tvdb_id}"),
                opts.bypass_cache,
                move || async move {
                    provider.extended_remote_ids(tvdb_id, kind).await.map(Some)
                },
            )
            .await;
        match result {
            Ok(found) => found,
            Err(err) => {
                debug!(
                    "tvdb extended fetch failed for tvdb:{}: {}",
                    tvdb_id, err
                );
                None
            }
        }
    }
}
