//! Cross-provider identity resolution and caching substrate.
//!
//! Given any one known provider id for a title, [`Resolver::resolve_all_ids`]
//! reconciles the TMDB/TVDB/IMDb/MAL/Kitsu/AniDB/AniList/TVmaze identities
//! for that title into a single [`idlink_model::ExternalIdentity`]. Its
//! sub-lookups flow through [`CacheManager`] (versioned, stampede-safe
//! cache-aside), and calls to the one strictly rate-limited upstream flow
//! through [`SerialQueue`].

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod franchise;
pub mod mapping;
pub mod providers;
pub mod queue;
pub mod resolver;
pub mod store;

pub use idlink_model as model;

pub use backend::{CacheBackend, MemoryBackend, RedisBackend};
pub use cache::CacheManager;
pub use config::{
    CoreConfig, DatasetConfig, QueueConfig, RequestOptions, TtlConfig,
};
pub use error::{ResolveError, Result};
pub use franchise::FranchiseSeasonMap;
pub use mapping::{MappingIndex, MappingTable};
pub use providers::{
    AggregatedIds, ImdbAggregator, KitsuBridge, KitsuDetails, Providers,
    TmdbBridge, TmdbExternalIds, TvdbBridge, TvdbRemoteIds, TvmazeBridge,
    TvmazeExternals,
};
pub use queue::SerialQueue;
pub use resolver::Resolver;
pub use store::IdentityStore;
