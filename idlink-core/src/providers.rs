//! Capability contracts for the upstream providers the resolver bridges
//! across. Concrete HTTP clients live outside this crate; tests inject
//! hand-rolled mocks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use idlink_model::{ContentKind, MappingKind};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// External ids attached to a TMDB title's detail record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TmdbExternalIds {
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<u64>,
}

/// Remote ids extracted from a TVDB extended record's remote-id list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TvdbRemoteIds {
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<u64>,
    pub tvmaze_id: Option<u64>,
}

/// The `externals` object of a TVmaze show.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TvmazeExternals {
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<u64>,
    pub tmdb_id: Option<u64>,
}

/// The slice of a Kitsu detail record the season logic needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitsuDetails {
    pub kitsu_id: u64,
    pub subtype: Option<MappingKind>,
    pub start_date: Option<NaiveDate>,
}

/// Cross-reference ids from the third-party imdb aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedIds {
    pub tmdb_id: Option<u64>,
    pub tvdb_id: Option<u64>,
}

#[async_trait]
pub trait TmdbBridge: Send + Sync {
    /// Fetch details with external ids for a known tmdb id.
    async fn external_ids(
        &self,
        tmdb_id: u64,
        kind: ContentKind,
    ) -> Result<TmdbExternalIds>;

    /// find-by-external-id: imdb id in, tmdb id out.
    async fn find_by_imdb(
        &self,
        imdb_id: &str,
        kind: ContentKind,
    ) -> Result<Option<u64>>;
}

#[async_trait]
pub trait TvdbBridge: Send + Sync {
    /// Fetch the extended entity (movie or series branch per `kind`) and
    /// surface its remote-id list.
    async fn extended_remote_ids(
        &self,
        tvdb_id: u64,
        kind: ContentKind,
    ) -> Result<TvdbRemoteIds>;

    /// find-by-remote-id: imdb id in, tvdb id out; the movie/series branch
    /// selects which sub-field of the response carries the id.
    async fn find_by_remote_id(
        &self,
        imdb_id: &str,
        kind: ContentKind,
    ) -> Result<Option<u64>>;
}

#[async_trait]
pub trait TvmazeBridge: Send + Sync {
    async fn lookup_by_imdb(&self, imdb_id: &str) -> Result<Option<u64>>;

    async fn show_externals(&self, tvmaze_id: u64) -> Result<TvmazeExternals>;
}

/// The one upstream with a strict requests/second limit. The resolver
/// serializes every call to this trait through its [`crate::SerialQueue`].
#[async_trait]
pub trait KitsuBridge: Send + Sync {
    /// Batch detail fetch for a set of kitsu ids.
    async fn details(&self, kitsu_ids: &[u64]) -> Result<Vec<KitsuDetails>>;
}

#[async_trait]
pub trait ImdbAggregator: Send + Sync {
    async fn lookup(&self, imdb_id: &str) -> Result<AggregatedIds>;
}

/// The full provider set injected into the resolver.
#[derive(Clone)]
pub struct Providers {
    pub tmdb: Arc<dyn TmdbBridge>,
    pub tvdb: Arc<dyn TvdbBridge>,
    pub tvmaze: Arc<dyn TvmazeBridge>,
    pub kitsu: Arc<dyn KitsuBridge>,
    pub imdb_aggregator: Arc<dyn ImdbAggregator>,
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}
