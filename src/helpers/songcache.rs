//! Cache of song records returned by the external providers.
//!
//! Every record is stored once under its canonical key (`"{source}:{externalId}"`),
//! with a secondary index from the bare external id to that key. The cache is a
//! bounded LRU and can be snapshotted to a JSON file mapping keys to records.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::data::SongRecord;

/// Default maximum number of cached songs
pub const DEFAULT_CACHE_CAPACITY: usize = 5000;

/// Prefix of the legacy `ext_<externalId>` identifiers
pub const LEGACY_KEY_PREFIX: &str = "ext_";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to replace snapshot file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("No snapshot file configured")]
    NoSnapshotFile,
}

/// Storage for provider results
pub trait SongStore: Send + Sync {
    /// Get a record by its canonical key
    fn get(&self, key: &str) -> Option<SongRecord>;

    /// Insert or replace a record. Returns the key it was stored under, or
    /// `None` if the record has no external id.
    fn put(&self, record: SongRecord) -> Option<String>;

    /// Find a record by the provider's external id
    fn find_by_external_id(&self, external_id: &str) -> Option<(String, SongRecord)>;

    /// Modify a record in place and return the updated copy
    fn update(&self, key: &str, apply: &mut dyn FnMut(&mut SongRecord)) -> Option<SongRecord>;

    /// Copy of all records, most recently used first
    fn records(&self) -> Vec<SongRecord>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strip the legacy `ext_` prefix from a lookup id
pub fn normalize_lookup_id(id: &str) -> &str {
    let id = id.trim();
    id.strip_prefix(LEGACY_KEY_PREFIX).unwrap_or(id)
}

/// Resolve a client supplied id (canonical key, external id or `ext_<externalId>`)
pub fn resolve(store: &dyn SongStore, id: &str) -> Option<(String, SongRecord)> {
    let id = normalize_lookup_id(id);
    if id.is_empty() {
        return None;
    }
    if let Some(record) = store.get(id) {
        return Some((id.to_string(), record));
    }
    store.find_by_external_id(id)
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub with_lyrics: usize,
    pub by_source: BTreeMap<String, usize>,
    pub dirty: bool,
    pub snapshot_file: Option<String>,
    pub last_saved: Option<DateTime<Utc>>,
}

struct CacheInner {
    entries: LruCache<String, SongRecord>,
    by_external_id: HashMap<String, String>,
}

impl CacheInner {
    fn insert(&mut self, key: String, mut record: SongRecord) {
        if let Some(existing) = self.entries.peek(&key) {
            // A new search result must not drop lyrics attached earlier
            if record.lyrics.is_none() {
                record.lyrics = existing.lyrics.clone();
                record.lyrics_state = existing.lyrics_state;
            }
        }

        if let Some(external_id) = &record.external_id {
            self.by_external_id.insert(external_id.clone(), key.clone());
        }

        if let Some((evicted_key, evicted)) = self.entries.push(key.clone(), record) {
            if evicted_key != key {
                debug!("Evicted {} from song cache", evicted_key);
                if let Some(external_id) = evicted.external_id {
                    if self.by_external_id.get(&external_id) == Some(&evicted_key) {
                        self.by_external_id.remove(&external_id);
                    }
                }
            }
        }
    }

    fn remove(&mut self, key: &str) -> Option<SongRecord> {
        let record = self.entries.pop(key)?;
        if let Some(external_id) = &record.external_id {
            if self.by_external_id.get(external_id).map(String::as_str) == Some(key) {
                self.by_external_id.remove(external_id);
            }
        }
        Some(record)
    }
}

/// LRU song cache with JSON snapshots
pub struct SongCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    snapshot_path: Option<PathBuf>,
    dirty: AtomicBool,
    last_saved: Mutex<Option<DateTime<Utc>>>,
}

impl SongCache {
    /// Create an in-memory cache without a snapshot file
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let entries = LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN));
        SongCache {
            inner: Mutex::new(CacheInner {
                entries,
                by_external_id: HashMap::new(),
            }),
            capacity,
            snapshot_path: None,
            dirty: AtomicBool::new(false),
            last_saved: Mutex::new(None),
        }
    }

    /// Create a cache that is persisted to `path`
    pub fn with_snapshot(capacity: usize, path: impl Into<PathBuf>) -> Self {
        let mut cache = Self::new(capacity);
        cache.snapshot_path = Some(path.into());
        cache
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Check if the cache changed since the last load or save
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// All entries with their keys, most recently used first
    pub fn entries(&self) -> Vec<(String, SongRecord)> {
        self.lock()
            .entries
            .iter()
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }

    /// Remove all entries matching a predicate, returns the number removed
    pub fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&str, &SongRecord) -> bool,
    {
        let mut inner = self.lock();
        let keys: Vec<String> = inner
            .entries
            .iter()
            .filter(|(key, record)| predicate(key, record))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        if !keys.is_empty() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        keys.len()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let mut by_source: BTreeMap<String, usize> = BTreeMap::new();
        let mut with_lyrics = 0;
        for (_, record) in inner.entries.iter() {
            *by_source.entry(record.source.to_string()).or_insert(0) += 1;
            if record.has_lyrics() {
                with_lyrics += 1;
            }
        }

        CacheStats {
            entries: inner.entries.len(),
            capacity: self.capacity,
            with_lyrics,
            by_source,
            dirty: self.is_dirty(),
            snapshot_file: self.snapshot_path.as_ref().map(|p| p.display().to_string()),
            last_saved: *self.last_saved.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Load the snapshot file into the cache.
    ///
    /// A missing file is not an error. Records are re-keyed by their canonical
    /// key, so snapshots that stored one record under several keys collapse to
    /// one entry per song.
    pub fn load_snapshot(&self) -> Result<usize, CacheError> {
        let path = self.snapshot_path.as_ref().ok_or(CacheError::NoSnapshotFile)?;
        if !path.exists() {
            info!("No cache snapshot at {}, starting with an empty cache", path.display());
            return Ok(0);
        }

        let content = fs::read_to_string(path)?;
        let snapshot: HashMap<String, SongRecord> = serde_json::from_str(&content)?;

        let mut inner = self.lock();
        for (key, mut record) in snapshot {
            record.normalize_lyrics_state();
            let key = record
                .cache_key()
                .unwrap_or_else(|| normalize_lookup_id(&key).to_string());
            inner.insert(key, record);
        }
        let loaded = inner.entries.len();
        drop(inner);

        self.dirty.store(false, Ordering::SeqCst);
        info!("Loaded {} cached songs from {}", loaded, path.display());
        Ok(loaded)
    }

    /// Write the whole cache to the snapshot file.
    ///
    /// The file is replaced atomically, so a crash during the write leaves the
    /// previous snapshot intact.
    pub fn save_snapshot(&self) -> Result<usize, CacheError> {
        let path = self.snapshot_path.as_ref().ok_or(CacheError::NoSnapshotFile)?;

        let snapshot: BTreeMap<String, SongRecord> = {
            let inner = self.lock();
            self.dirty.store(false, Ordering::SeqCst);
            inner
                .entries
                .iter()
                .map(|(key, record)| {
                    let mut record = record.clone();
                    record.normalize_lyrics_state();
                    (key.clone(), record)
                })
                .collect()
        };

        if let Err(e) = Self::write_snapshot(path, &snapshot) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }

        *self.last_saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        info!("Saved {} cached songs to {}", snapshot.len(), path.display());
        Ok(snapshot.len())
    }

    fn write_snapshot(path: &Path, snapshot: &BTreeMap<String, SongRecord>) -> Result<(), CacheError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut file = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut file, snapshot)?;
        file.flush()?;
        file.persist(path)?;
        Ok(())
    }

    /// Save the snapshot if anything changed since the last save
    pub fn save_if_dirty(&self) -> Result<Option<usize>, CacheError> {
        if !self.is_dirty() {
            return Ok(None);
        }
        self.save_snapshot().map(Some)
    }
}

impl SongStore for SongCache {
    fn get(&self, key: &str) -> Option<SongRecord> {
        self.lock().entries.get(key).cloned()
    }

    fn put(&self, record: SongRecord) -> Option<String> {
        let key = match record.cache_key() {
            Some(key) => key,
            None => {
                warn!("Not caching {}: no external id", record);
                return None;
            }
        };
        self.lock().insert(key.clone(), record);
        self.dirty.store(true, Ordering::SeqCst);
        Some(key)
    }

    fn find_by_external_id(&self, external_id: &str) -> Option<(String, SongRecord)> {
        let mut inner = self.lock();
        let key = inner.by_external_id.get(external_id)?.clone();
        let record = inner.entries.get(&key)?.clone();
        Some((key, record))
    }

    fn update(&self, key: &str, apply: &mut dyn FnMut(&mut SongRecord)) -> Option<SongRecord> {
        let mut inner = self.lock();
        let record = inner.entries.get_mut(key)?;
        apply(record);
        let updated = record.clone();
        drop(inner);
        self.dirty.store(true, Ordering::SeqCst);
        Some(updated)
    }

    fn records(&self) -> Vec<SongRecord> {
        self.lock().entries.iter().map(|(_, record)| record.clone()).collect()
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Lyrics, LyricsState, Source};
    use tempfile::tempdir;

    fn spotify_song(id: &str, title: &str) -> SongRecord {
        let mut song = SongRecord::new(title, "YOASOBI", Source::Spotify);
        song.external_id = Some(id.to_string());
        song
    }

    fn lyrics(text: &str) -> Lyrics {
        Lyrics {
            original: text.to_string(),
            hiragana: text.to_string(),
            romaji: text.to_string(),
        }
    }

    #[test]
    fn test_put_and_resolve_all_id_forms() {
        let cache = SongCache::new(10);
        let key = cache.put(spotify_song("abc123", "Idol")).unwrap();
        assert_eq!(key, "spotify:abc123");

        let (k1, by_key) = resolve(&cache, "spotify:abc123").unwrap();
        let (k2, by_id) = resolve(&cache, "abc123").unwrap();
        let (k3, by_legacy) = resolve(&cache, "ext_abc123").unwrap();

        assert_eq!(k1, key);
        assert_eq!(k2, key);
        assert_eq!(k3, key);
        assert_eq!(by_key, by_id);
        assert_eq!(by_id, by_legacy);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_resolve_unknown() {
        let cache = SongCache::new(10);
        assert!(resolve(&cache, "ext_12345").is_none());
        assert!(resolve(&cache, "").is_none());
        assert!(resolve(&cache, "ext_").is_none());
    }

    #[test]
    fn test_record_without_external_id_is_not_cached() {
        let cache = SongCache::new(10);
        assert!(cache.put(SongRecord::new("Idol", "YOASOBI", Source::Spotify)).is_none());
        assert!(cache.is_empty());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_update_is_visible_through_every_id() {
        let cache = SongCache::new(10);
        let key = cache.put(spotify_song("abc123", "Idol")).unwrap();

        cache.update(&key, &mut |record: &mut SongRecord| record.set_lyrics(lyrics("無敵の笑顔で荒らすメディア")));

        let (_, via_legacy) = resolve(&cache, "ext_abc123").unwrap();
        let (_, via_id) = resolve(&cache, "abc123").unwrap();
        assert_eq!(via_legacy.lyrics_state, LyricsState::Present);
        assert_eq!(via_legacy, via_id);
    }

    #[test]
    fn test_put_keeps_existing_lyrics() {
        let cache = SongCache::new(10);
        let key = cache.put(spotify_song("abc123", "Idol")).unwrap();
        cache.update(&key, &mut |record: &mut SongRecord| record.set_lyrics(lyrics("la la la")));

        let mut refreshed = spotify_song("abc123", "Idol");
        refreshed.popularity = 99;
        cache.put(refreshed);

        let record = cache.get(&key).unwrap();
        assert_eq!(record.popularity, 99);
        assert_eq!(record.lyrics.unwrap().original, "la la la");
        assert_eq!(record.lyrics_state, LyricsState::Present);
    }

    #[test]
    fn test_eviction_drops_index_entry() {
        let cache = SongCache::new(2);
        cache.put(spotify_song("a", "A"));
        cache.put(spotify_song("b", "B"));
        cache.put(spotify_song("c", "C"));

        assert_eq!(cache.len(), 2);
        assert!(cache.find_by_external_id("a").is_none());
        assert!(cache.find_by_external_id("b").is_some());
        assert!(cache.find_by_external_id("c").is_some());
    }

    #[test]
    fn test_remove_where() {
        let cache = SongCache::new(10);
        cache.put(spotify_song("a", "A"));
        let mut genius = SongRecord::new("B", "Ado", Source::Genius);
        genius.external_id = Some("42".to_string());
        cache.put(genius);

        let removed = cache.remove_where(|_, record| record.source == Source::Genius);
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.find_by_external_id("42").is_none());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = SongCache::with_snapshot(10, &path);
        let key = cache.put(spotify_song("abc123", "Idol")).unwrap();
        cache.update(&key, &mut |record: &mut SongRecord| record.set_lyrics(lyrics("la la la")));
        assert!(cache.is_dirty());
        assert_eq!(cache.save_snapshot().unwrap(), 1);
        assert!(!cache.is_dirty());
        assert!(cache.stats().last_saved.is_some());

        let restored = SongCache::with_snapshot(10, &path);
        assert_eq!(restored.load_snapshot().unwrap(), 1);
        let (_, record) = resolve(&restored, "ext_abc123").unwrap();
        assert_eq!(record.title, "Idol");
        assert_eq!(record.lyrics.unwrap().original, "la la la");
    }

    #[test]
    fn test_load_legacy_snapshot_with_duplicate_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let record = r#"{"title": "Idol", "artist": "YOASOBI", "externalId": "abc123", "source": "spotify", "lyrics": null}"#;
        fs::write(&path, format!(r#"{{"abc123": {record}, "ext_abc123": {record}}}"#)).unwrap();

        let cache = SongCache::with_snapshot(10, &path);
        assert_eq!(cache.load_snapshot().unwrap(), 1);
        assert!(cache.get("spotify:abc123").is_some());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_load_missing_and_corrupt_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = SongCache::with_snapshot(10, &path);
        assert_eq!(cache.load_snapshot().unwrap(), 0);

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(cache.load_snapshot(), Err(CacheError::Serialization(_))));

        let in_memory = SongCache::new(10);
        assert!(matches!(in_memory.save_snapshot(), Err(CacheError::NoSnapshotFile)));
    }

    #[test]
    fn test_save_if_dirty() {
        let dir = tempdir().unwrap();
        let cache = SongCache::with_snapshot(10, dir.path().join("cache.json"));
        assert_eq!(cache.save_if_dirty().unwrap(), None);

        cache.put(spotify_song("a", "A"));
        assert_eq!(cache.save_if_dirty().unwrap(), Some(1));
        assert_eq!(cache.save_if_dirty().unwrap(), None);
    }

    #[test]
    fn test_stats() {
        let cache = SongCache::new(10);
        let key = cache.put(spotify_song("a", "A")).unwrap();
        cache.put(spotify_song("b", "B"));
        cache.update(&key, &mut |record: &mut SongRecord| record.set_lyrics(lyrics("x")));

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.with_lyrics, 1);
        assert_eq!(stats.by_source.get("spotify"), Some(&2));
        assert!(stats.dirty);
    }
}
