use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use idlink_model::{ContentKind, StaticMappingEntry};
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::DatasetConfig;
use crate::error::Result;

/// In-memory indices over one load of the static mapping dataset.
///
/// Rebuilt wholesale on every (re)load and swapped in atomically; never
/// partially mutated.
#[derive(Debug, Default)]
pub struct MappingIndex {
    entries: Vec<StaticMappingEntry>,
    by_mal: HashMap<u64, usize>,
    by_kitsu: HashMap<u64, usize>,
    by_anidb: HashMap<u64, usize>,
    by_anilist: HashMap<u64, usize>,
    by_tvdb: HashMap<u64, Vec<usize>>,
    by_imdb: HashMap<String, Vec<usize>>,
    /// Entries carrying a tmdb id, scanned linearly: the table is small and
    /// tmdb lookups need type disambiguation anyway.
    tmdb_entries: Vec<usize>,
}

impl MappingIndex {
    pub fn from_entries(entries: Vec<StaticMappingEntry>) -> Self {
        let mut index = Self {
            entries,
            ..Self::default()
        };

        for (pos, entry) in index.entries.iter().enumerate() {
            if let Some(id) = entry.mal_id {
                index.by_mal.insert(id, pos);
            }
            if let Some(id) = entry.kitsu_id {
                index.by_kitsu.insert(id, pos);
            }
            if let Some(id) = entry.anidb_id {
                index.by_anidb.insert(id, pos);
            }
            if let Some(id) = entry.anilist_id {
                index.by_anilist.insert(id, pos);
            }
            if let Some(id) = entry.tvdb_id {
                index.by_tvdb.entry(id).or_default().push(pos);
            }
            if let Some(ref id) = entry.imdb_id {
                index.by_imdb.entry(id.clone()).or_default().push(pos);
            }
            if entry.tmdb_id.is_some() {
                index.tmdb_entries.push(pos);
            }
        }

        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_mal(&self, id: u64) -> Option<&StaticMappingEntry> {
        self.by_mal.get(&id).map(|&pos| &self.entries[pos])
    }

    pub fn by_kitsu(&self, id: u64) -> Option<&StaticMappingEntry> {
        self.by_kitsu.get(&id).map(|&pos| &self.entries[pos])
    }

    pub fn by_anidb(&self, id: u64) -> Option<&StaticMappingEntry> {
        self.by_anidb.get(&id).map(|&pos| &self.entries[pos])
    }

    pub fn by_anilist(&self, id: u64) -> Option<&StaticMappingEntry> {
        self.by_anilist.get(&id).map(|&pos| &self.entries[pos])
    }

    /// Franchise siblings sharing one tvdb id.
    pub fn by_tvdb(&self, id: u64) -> Vec<&StaticMappingEntry> {
        self.by_tvdb
            .get(&id)
            .map(|positions| {
                positions.iter().map(|&pos| &self.entries[pos]).collect()
            })
            .unwrap_or_default()
    }

    /// Siblings sharing one imdb id.
    pub fn by_imdb(&self, id: &str) -> Vec<&StaticMappingEntry> {
        self.by_imdb
            .get(id)
            .map(|positions| {
                positions.iter().map(|&pos| &self.entries[pos]).collect()
            })
            .unwrap_or_default()
    }

    /// Tmdb lookup with type disambiguation: a unique match wins outright;
    /// among several, an entry whose type tag matches the requested kind is
    /// preferred; failing that the first match is returned as documented
    /// best-effort.
    pub fn by_tmdb(
        &self,
        tmdb_id: u64,
        kind: ContentKind,
    ) -> Option<&StaticMappingEntry> {
        let matches: Vec<&StaticMappingEntry> = self
            .tmdb_entries
            .iter()
            .map(|&pos| &self.entries[pos])
            .filter(|entry| entry.tmdb_id == Some(tmdb_id))
            .collect();

        match matches.as_slice() {
            [] => None,
            [only] => Some(only),
            [first, ..] => {
                if let Some(entry) = matches
                    .iter()
                    .find(|entry| entry.kind.is_some_and(|k| k.matches(kind)))
                {
                    return Some(entry);
                }
                warn!(
                    "ambiguous tmdb id {} ({} entries, none tagged {}), returning first match",
                    tmdb_id,
                    matches.len(),
                    kind
                );
                Some(first)
            }
        }
    }
}

enum RemoteDataset {
    Unchanged,
    Fresh {
        body: String,
        etag: Option<String>,
    },
}

/// Loader and owner of the static mapping indices.
///
/// Lookups never fail: before a successful load (or after a total load
/// failure) they simply report "not found" against empty indices.
pub struct MappingTable {
    http: reqwest::Client,
    config: DatasetConfig,
    index: RwLock<Arc<MappingIndex>>,
    loaded: AtomicBool,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for MappingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingTable")
            .field("loaded", &self.loaded.load(Ordering::Acquire))
            .field("entries", &self.snapshot().len())
            .finish()
    }
}

impl MappingTable {
    pub fn new(config: DatasetConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            config,
            index: RwLock::new(Arc::new(MappingIndex::default())),
            loaded: AtomicBool::new(false),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Build a pre-loaded table from entries already in hand. Used by tests
    /// and by embedders that ship the dataset themselves.
    pub fn with_entries(entries: Vec<StaticMappingEntry>) -> Self {
        let table = Self::new(DatasetConfig::default());
        table.install(entries);
        table.loaded.store(true, Ordering::Release);
        table
    }

    /// Load the dataset if it has not been loaded yet. Idempotent and safe
    /// to call concurrently; later callers wait for the first load. Never
    /// fails: a total load failure leaves the indices empty.
    pub async fn initialize(&self) {
        if self.loaded.load(Ordering::Acquire) {
            return;
        }
        let _guard = self.refresh_lock.lock().await;
        if self.loaded.load(Ordering::Acquire) {
            return;
        }
        self.refresh().await;
        self.loaded.store(true, Ordering::Release);
    }

    /// Force a staleness check against the remote dataset, regardless of
    /// whether a load already happened.
    pub async fn reload(&self) {
        let _guard = self.refresh_lock.lock().await;
        self.refresh().await;
        self.loaded.store(true, Ordering::Release);
    }

    async fn refresh(&self) {
        let marker = fs::read_to_string(&self.config.marker_path)
            .await
            .ok()
            .map(|s| s.trim().to_string());

        match self.fetch_remote(marker.as_deref()).await {
            Ok(RemoteDataset::Unchanged) => {
                debug!("static mapping dataset unchanged upstream");
                match self.load_snapshot().await {
                    Some(entries) => self.install(entries),
                    // Marker said unchanged but the snapshot is gone; fetch
                    // the full dataset once without the marker.
                    None => match self.fetch_remote(None).await {
                        Ok(RemoteDataset::Fresh { body, etag }) => {
                            self.adopt_fresh(body, etag).await;
                        }
                        Ok(RemoteDataset::Unchanged) | Err(_) => {
                            warn!(
                                "static mapping snapshot missing and re-fetch failed; indices stay empty"
                            );
                        }
                    },
                }
            }
            Ok(RemoteDataset::Fresh { body, etag }) => {
                self.adopt_fresh(body, etag).await;
            }
            Err(err) => {
                warn!(
                    "static mapping refresh failed ({}); falling back to snapshot",
                    err
                );
                if let Some(entries) = self.load_snapshot().await {
                    self.install(entries);
                }
            }
        }
    }

    async fn fetch_remote(&self, marker: Option<&str>) -> Result<RemoteDataset> {
        let mut request = self.http.get(&self.config.url);
        if let Some(marker) = marker {
            request = request.header(IF_NONE_MATCH, marker);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(RemoteDataset::Unchanged);
        }

        let response = response.error_for_status()?;
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let body = response.text().await?;

        Ok(RemoteDataset::Fresh { body, etag })
    }

    /// Parse a freshly downloaded dataset, persist the snapshot and change
    /// marker, and swap the indices in. Persistence failures only cost the
    /// next boot its fallback; they are logged, not raised.
    async fn adopt_fresh(&self, body: String, etag: Option<String>) {
        let entries: Vec<StaticMappingEntry> =
            match serde_json::from_str(&body) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("downloaded static mapping dataset is malformed: {}", err);
                    if let Some(entries) = self.load_snapshot().await {
                        self.install(entries);
                    }
                    return;
                }
            };

        if let Some(parent) = self.config.snapshot_path.parent()
            && let Err(err) = fs::create_dir_all(parent).await
        {
            warn!("could not create snapshot directory: {}", err);
        }
        if let Err(err) = fs::write(&self.config.snapshot_path, &body).await {
            warn!("could not persist static mapping snapshot: {}", err);
        }
        if let Some(etag) = etag {
            if let Err(err) = fs::write(&self.config.marker_path, &etag).await {
                warn!("could not persist static mapping change marker: {}", err);
            }
        }

        info!("static mapping dataset refreshed: {} entries", entries.len());
        self.install(entries);
    }

    async fn load_snapshot(&self) -> Option<Vec<StaticMappingEntry>> {
        let raw = match fs::read_to_string(&self.config.snapshot_path).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!("static mapping snapshot unavailable: {}", err);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => Some(entries),
            Err(err) => {
                warn!("static mapping snapshot is corrupt: {}", err);
                None
            }
        }
    }

    fn install(&self, entries: Vec<StaticMappingEntry>) {
        let index = Arc::new(MappingIndex::from_entries(entries));
        debug!("static mapping indices rebuilt: {} entries", index.len());
        *self
            .index
            .write()
            .expect("mapping index lock poisoned") = index;
    }

    /// A consistent point-in-time view of the indices.
    pub fn snapshot(&self) -> Arc<MappingIndex> {
        Arc::clone(
            &self.index.read().expect("mapping index lock poisoned"),
        )
    }

    pub fn mapping_by_mal(&self, id: u64) -> Option<StaticMappingEntry> {
        self.snapshot().by_mal(id).cloned()
    }

    pub fn mapping_by_kitsu(&self, id: u64) -> Option<StaticMappingEntry> {
        self.snapshot().by_kitsu(id).cloned()
    }

    pub fn mapping_by_anidb(&self, id: u64) -> Option<StaticMappingEntry> {
        self.snapshot().by_anidb(id).cloned()
    }

    pub fn mapping_by_anilist(&self, id: u64) -> Option<StaticMappingEntry> {
        self.snapshot().by_anilist(id).cloned()
    }

    pub fn mappings_by_tvdb(&self, id: u64) -> Vec<StaticMappingEntry> {
        self.snapshot().by_tvdb(id).into_iter().cloned().collect()
    }

    pub fn mappings_by_imdb(&self, id: &str) -> Vec<StaticMappingEntry> {
        self.snapshot().by_imdb(id).into_iter().cloned().collect()
    }

    pub fn mapping_by_tmdb(
        &self,
        tmdb_id: u64,
        kind: ContentKind,
    ) -> Option<StaticMappingEntry> {
        self.snapshot().by_tmdb(tmdb_id, kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use idlink_model::MappingKind;

    use super::*;

    fn entry(
        tmdb: Option<u64>,
        kind: Option<MappingKind>,
        mal: Option<u64>,
    ) -> StaticMappingEntry {
        StaticMappingEntry {
            tmdb_id: tmdb,
            kind,
            mal_id: mal,
            ..Default::default()
        }
    }

    #[test]
    fn tmdb_lookup_prefers_matching_kind() {
        let index = MappingIndex::from_entries(vec![
            entry(Some(999), Some(MappingKind::Movie), Some(1)),
            entry(Some(999), Some(MappingKind::Tv), Some(2)),
        ]);

        let movie = index.by_tmdb(999, ContentKind::Movie).unwrap();
        assert_eq!(movie.mal_id, Some(1));

        let series = index.by_tmdb(999, ContentKind::Series).unwrap();
        assert_eq!(series.mal_id, Some(2));
    }

    #[test]
    fn tmdb_lookup_falls_back_to_first_match() {
        let index = MappingIndex::from_entries(vec![
            entry(Some(999), Some(MappingKind::Tv), Some(1)),
            entry(Some(999), Some(MappingKind::Ona), Some(2)),
        ]);

        // Neither entry is a movie; documented best-effort first match.
        let fallback = index.by_tmdb(999, ContentKind::Movie).unwrap();
        assert_eq!(fallback.mal_id, Some(1));
    }

    #[test]
    fn tmdb_lookup_misses_cleanly() {
        let index = MappingIndex::from_entries(vec![entry(
            Some(1),
            Some(MappingKind::Movie),
            None,
        )]);
        assert!(index.by_tmdb(2, ContentKind::Movie).is_none());
    }

    #[test]
    fn list_valued_indices_collect_siblings() {
        let mut a = entry(None, Some(MappingKind::Tv), Some(10));
        a.tvdb_id = Some(79481);
        a.imdb_id = Some("tt0877057".to_string());
        let mut b = entry(None, Some(MappingKind::Special), Some(11));
        b.tvdb_id = Some(79481);
        b.imdb_id = Some("tt0877057".to_string());

        let index = MappingIndex::from_entries(vec![a, b]);
        assert_eq!(index.by_tvdb(79481).len(), 2);
        assert_eq!(index.by_imdb("tt0877057").len(), 2);
        assert_eq!(index.by_mal(10).unwrap().mal_id, Some(10));
    }

    #[test]
    fn empty_table_reports_not_found() {
        let table = MappingTable::with_entries(Vec::new());
        assert!(table.mapping_by_mal(1535).is_none());
        assert!(table.mappings_by_tvdb(79481).is_empty());
        assert!(table.mapping_by_tmdb(999, ContentKind::Series).is_none());
    }
}
