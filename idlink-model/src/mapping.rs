use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Content type requested by a caller of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Series,
    Anime,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Anime => "anime",
        }
    }

    /// Movies aside, everything here resolves through series-shaped
    /// provider endpoints.
    pub fn is_series_like(&self) -> bool {
        !matches!(self, Self::Movie)
    }
}

impl FromStr for ContentKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(Self::Movie),
            "series" => Ok(Self::Series),
            "anime" => Ok(Self::Anime),
            other => Err(ModelError::UnknownContentKind(other.to_string())),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `type` tag carried by static mapping entries. The upstream dataset
/// uses uppercase tags; accept both spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    #[serde(alias = "MOVIE")]
    Movie,
    #[serde(alias = "TV")]
    Tv,
    #[serde(alias = "OVA")]
    Ova,
    #[serde(alias = "ONA")]
    Ona,
    #[serde(alias = "SPECIAL")]
    Special,
}

impl MappingKind {
    pub fn is_series_like(&self) -> bool {
        !matches!(self, Self::Movie)
    }

    /// Whether an entry with this tag satisfies a caller asking for `kind`.
    pub fn matches(&self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Movie => matches!(self, Self::Movie),
            ContentKind::Series | ContentKind::Anime => self.is_series_like(),
        }
    }
}

/// One immutable record of the precomputed cross-reference dataset.
///
/// Serde aliases cover the upstream dataset's historical field names
/// (`thetvdb_id`, `themoviedb_id`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMappingEntry {
    pub mal_id: Option<u64>,
    pub kitsu_id: Option<u64>,
    pub anidb_id: Option<u64>,
    pub anilist_id: Option<u64>,
    #[serde(alias = "thetvdb_id")]
    pub tvdb_id: Option<u64>,
    #[serde(alias = "themoviedb_id")]
    pub tmdb_id: Option<u64>,
    pub imdb_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<MappingKind>,
    pub start_date: Option<NaiveDate>,
}

impl StaticMappingEntry {
    /// View this entry as an identity fragment for fill-only merging.
    pub fn to_identity(&self) -> crate::identity::ExternalIdentity {
        crate::identity::ExternalIdentity {
            tmdb_id: self.tmdb_id,
            tvdb_id: self.tvdb_id,
            imdb_id: self.imdb_id.clone(),
            mal_id: self.mal_id,
            kitsu_id: self.kitsu_id,
            anidb_id: self.anidb_id,
            anilist_id: self.anilist_id,
            tvmaze_id: None,
        }
    }
}
