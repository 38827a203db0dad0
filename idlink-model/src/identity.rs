use serde::{Deserialize, Serialize};

use crate::ids::ParsedId;

/// The merged cross-provider identity of a single title.
///
/// Fields are fill-only: once a field is populated during a resolution it is
/// never overwritten by a value discovered later. All merge sites go through
/// [`ExternalIdentity::fill_from`] so the rule cannot be applied unevenly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalIdentity {
    pub tmdb_id: Option<u64>,
    pub tvdb_id: Option<u64>,
    pub imdb_id: Option<String>,
    pub mal_id: Option<u64>,
    pub kitsu_id: Option<u64>,
    pub anidb_id: Option<u64>,
    pub anilist_id: Option<u64>,
    pub tvmaze_id: Option<u64>,
}

macro_rules! fill {
    ($dst:expr, $src:expr, $($field:ident),+ $(,)?) => {
        $(
            if $dst.$field.is_none() {
                $dst.$field = $src.$field.clone();
            }
        )+
    };
}

impl ExternalIdentity {
    /// Seed an identity from a single parsed id.
    pub fn seeded(id: &ParsedId) -> Self {
        let mut identity = Self::default();
        match id {
            ParsedId::Tmdb(v) => identity.tmdb_id = Some(*v),
            ParsedId::Tvdb(v) => identity.tvdb_id = Some(*v),
            ParsedId::Imdb(v) => identity.imdb_id = Some(v.clone()),
            ParsedId::Mal(v) => identity.mal_id = Some(*v),
            ParsedId::Kitsu(v) => identity.kitsu_id = Some(*v),
            ParsedId::Tvmaze(v) => identity.tvmaze_id = Some(*v),
            ParsedId::Anidb(v) => identity.anidb_id = Some(*v),
            ParsedId::Anilist(v) => identity.anilist_id = Some(*v),
        }
        identity
    }

    /// Fill-only merge: copy each field from `other` only if it is still
    /// unset here.
    pub fn fill_from(&mut self, other: &ExternalIdentity) {
        fill!(
            self, other, tmdb_id, tvdb_id, imdb_id, mal_id, kitsu_id, anidb_id,
            anilist_id, tvmaze_id,
        );
    }

    /// True if any anime-ecosystem id is already known.
    pub fn has_anime_ids(&self) -> bool {
        self.mal_id.is_some()
            || self.kitsu_id.is_some()
            || self.anidb_id.is_some()
            || self.anilist_id.is_some()
    }

    /// True once every general-catalog id is known; resolution for non-anime
    /// content can stop early at that point.
    pub fn has_general_ids(&self) -> bool {
        self.tmdb_id.is_some()
            && self.tvdb_id.is_some()
            && self.imdb_id.is_some()
            && self.tvmaze_id.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&ParsedId> for ExternalIdentity {
    fn from(id: &ParsedId) -> Self {
        Self::seeded(id)
    }
}
