//! Franchise and season derivations over the static mapping table.
//!
//! Season numbers are assigned strictly by ascending start date of the
//! series-like siblings. Release chronology is known to disagree with
//! canonical season order for some prequel specials; that is documented
//! behavior, not corrected here.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use idlink_model::MappingKind;
use tracing::debug;

use crate::providers::KitsuDetails;
use crate::resolver::Resolver;

/// Season number → kitsu id for one franchise, derived by sorting the tvdb
/// siblings chronologically.
#[derive(Debug, Clone, Default)]
pub struct FranchiseSeasonMap {
    seasons: BTreeMap<u32, u64>,
}

impl FranchiseSeasonMap {
    pub fn kitsu_for_season(&self, season: u32) -> Option<u64> {
        self.seasons.get(&season).copied()
    }

    pub fn len(&self) -> usize {
        self.seasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seasons.is_empty()
    }

    pub fn seasons(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.seasons.iter().map(|(&season, &kitsu)| (season, kitsu))
    }
}

fn by_start_date(a: &KitsuDetails, b: &KitsuDetails) -> Ordering {
    match (a.start_date, b.start_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        // Undated entries sort to the end.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl Resolver {
    /// Derive (and memoize) the season map for all static-table siblings
    /// sharing `tvdb_id`.
    pub async fn build_franchise_map(
        &self,
        tvdb_id: u64,
    ) -> Arc<FranchiseSeasonMap> {
        if let Some(found) = self.franchise_memo.get(&tvdb_id) {
            return Arc::clone(found.value());
        }

        let siblings = self.mappings.mappings_by_tvdb(tvdb_id);
        let kitsu_ids: Vec<u64> =
            siblings.iter().filter_map(|entry| entry.kitsu_id).collect();

        let mut details = self.kitsu_details(&kitsu_ids).await;
        details.retain(|d| d.subtype.is_some_and(|s| s.is_series_like()));
        details.sort_by(by_start_date);

        let seasons = details
            .iter()
            .enumerate()
            .map(|(pos, d)| (pos as u32 + 1, d.kitsu_id))
            .collect();
        let map = Arc::new(FranchiseSeasonMap { seasons });

        debug!(
            "franchise map built for tvdb:{}: {} seasons",
            tvdb_id,
            map.len()
        );
        self.franchise_memo.insert(tvdb_id, Arc::clone(&map));
        map
    }

    /// The kitsu id occupying `season` of the franchise rooted at `tvdb_id`.
    pub async fn kitsu_id_for_tvdb_season(
        &self,
        tvdb_id: u64,
        season: u32,
    ) -> Option<u64> {
        self.build_franchise_map(tvdb_id)
            .await
            .kitsu_for_season(season)
    }

    /// The 1-based season a kitsu entry occupies under its imdb parent, or
    /// `None` when the entry is unmapped or not a TV sibling.
    pub async fn imdb_season_from_kitsu(&self, kitsu_id: u64) -> Option<u32> {
        if let Some(found) = self.imdb_season_memo.get(&kitsu_id) {
            return *found.value();
        }

        let season = self.compute_imdb_season(kitsu_id).await;
        self.imdb_season_memo.insert(kitsu_id, season);
        season
    }

    async fn compute_imdb_season(&self, kitsu_id: u64) -> Option<u32> {
        let base = self.mappings.mapping_by_kitsu(kitsu_id)?;
        let imdb_id = base.imdb_id?;

        let siblings = self.mappings.mappings_by_imdb(&imdb_id);
        if siblings.len() == 1 {
            return Some(1);
        }

        let kitsu_ids: Vec<u64> =
            siblings.iter().filter_map(|entry| entry.kitsu_id).collect();
        let mut details = self.kitsu_details(&kitsu_ids).await;
        details.retain(|d| d.subtype == Some(MappingKind::Tv));
        details.sort_by(by_start_date);

        details
            .iter()
            .position(|d| d.kitsu_id == kitsu_id)
            .map(|pos| pos as u32 + 1)
    }

    /// Batch detail fetch for kitsu ids: cached per id set, and serialized
    /// through the rate-limited queue on a miss.
    pub(crate) async fn kitsu_details(
        &self,
        kitsu_ids: &[u64],
    ) -> Vec<KitsuDetails> {
        if kitsu_ids.is_empty() {
            return Vec::new();
        }

        let key = kitsu_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let provider = Arc::clone(&self.providers.kitsu);
        let queue = Arc::clone(&self.kitsu_queue);
        let ids: Arc<[u64]> = Arc::from(kitsu_ids);

        let result = self
            .cache
            .wrap_provider("kitsu", &format!("details:{key}"), false, move || {
                async move {
                    queue
                        .enqueue(move || {
                            let provider = Arc::clone(&provider);
                            let ids = Arc::clone(&ids);
                            async move { provider.details(&ids).await }
                        })
                        .await
                        .map(Some)
                }
            })
            .await;

        match result {
            Ok(Some(details)) => details,
            Ok(None) => Vec::new(),
            Err(err) => {
                debug!("kitsu batch details failed: {}", err);
                Vec::new()
            }
        }
    }
}
