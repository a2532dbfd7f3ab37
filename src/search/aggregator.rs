//! Fan-out search over the external providers and lazy lyrics attachment.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::data::{Lyrics, LyricsState, SongRecord, Source, VideoResult};
use crate::helpers::lyrics::{LyricsLookup, LyricsProvider, LyricsResult};
use crate::helpers::songcache::{normalize_lookup_id, resolve, SongStore};
use crate::helpers::songlibrary::SongLibrary;
use crate::helpers::transliteration::Transliterator;
use crate::providers::{TrackProvider, VideoProvider};
use crate::search::local::{search_songs, SearchOptions};

/// Minimum trimmed query length for suggestions
pub const MIN_SUGGESTION_CHARS: usize = 2;

/// Results requested per provider when resolving an id by search
const ID_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Song is not cached and live lookup is disabled")]
    NotCached,

    #[error("Song not found")]
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeResults {
    pub database: Vec<SongRecord>,
    pub external: Vec<SongRecord>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub title: String,
    pub artist: String,
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Combines the track providers, the result cache and the lyrics providers
pub struct SearchAggregator {
    providers: Vec<Arc<dyn TrackProvider>>,
    videos: Option<Arc<dyn VideoProvider>>,
    lyrics: Arc<dyn LyricsProvider>,
    store: Arc<dyn SongStore>,
    transliterator: Arc<dyn Transliterator>,
    library: Option<Arc<SongLibrary>>,
    live_lookup: bool,
    lyrics_locks: Mutex<HashMap<String, KeyLock>>,
}

impl SearchAggregator {
    pub fn new(
        store: Arc<dyn SongStore>,
        lyrics: Arc<dyn LyricsProvider>,
        transliterator: Arc<dyn Transliterator>,
    ) -> Self {
        SearchAggregator {
            providers: Vec::new(),
            videos: None,
            lyrics,
            store,
            transliterator,
            library: None,
            live_lookup: true,
            lyrics_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Add a track provider; results are concatenated in the order providers were added
    pub fn with_provider(mut self, provider: Arc<dyn TrackProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_video_provider(mut self, provider: Arc<dyn VideoProvider>) -> Self {
        self.videos = Some(provider);
        self
    }

    pub fn with_library(mut self, library: Arc<SongLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Whether ids missing from the cache may be looked up at the providers
    pub fn with_live_lookup(mut self, live_lookup: bool) -> Self {
        self.live_lookup = live_lookup;
        self
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.provider_name()).collect()
    }

    fn enabled_providers(&self) -> Vec<&Arc<dyn TrackProvider>> {
        self.providers.iter().filter(|p| p.is_enabled()).collect()
    }

    fn library_songs(&self) -> Vec<SongRecord> {
        let Some(library) = &self.library else {
            return Vec::new();
        };
        library.all().unwrap_or_else(|e| {
            warn!("Could not read library songs: {}", e);
            Vec::new()
        })
    }

    /// Keep the first occurrence of every (title, artist) pair, then cache the survivors
    fn merge_and_cache(&self, results: Vec<Vec<SongRecord>>, limit: usize) -> Vec<SongRecord> {
        let mut seen = HashSet::new();
        let mut songs: Vec<SongRecord> = results
            .into_iter()
            .flatten()
            .filter(|song| seen.insert(song.dedupe_key()))
            .collect();
        songs.truncate(limit);

        for song in &songs {
            self.store.put(song.clone());
        }
        songs
    }

    /// Search every enabled provider concurrently
    pub async fn search_multiple_sources(&self, query: &str, limit: usize) -> Vec<SongRecord> {
        let providers = self.enabled_providers();
        if providers.is_empty() {
            debug!("No track providers enabled, skipping external search for '{}'", query);
            return Vec::new();
        }

        let results = join_all(providers.iter().map(|p| p.search(query, limit))).await;
        let songs = self.merge_and_cache(results, limit);
        info!("External search for '{}' returned {} songs", query, songs.len());
        songs
    }

    /// Library matches plus, optionally, external results
    pub async fn search_realtime(&self, query: &str, limit: usize, include_external: bool) -> RealtimeResults {
        let options = SearchOptions {
            limit,
            ..Default::default()
        };
        let database = search_songs(self.library_songs(), query, &options).songs;
        let external = if include_external {
            self.search_multiple_sources(query, limit).await
        } else {
            Vec::new()
        };

        RealtimeResults {
            total: database.len() + external.len(),
            database,
            external,
        }
    }

    /// Cached record for any accepted id form, without upstream calls
    pub fn find_cached(&self, id: &str) -> Option<SongRecord> {
        resolve(self.store.as_ref(), id).map(|(_, record)| record)
    }

    /// Resolve an external song and make sure its lyrics are attached
    pub async fn get_external_song(&self, id: &str) -> Result<SongRecord, LookupError> {
        let key = match resolve(self.store.as_ref(), id) {
            Some((key, _)) => key,
            None if !self.live_lookup => return Err(LookupError::NotCached),
            None => self.lookup_upstream(normalize_lookup_id(id)).await.ok_or(LookupError::NotFound)?,
        };
        self.ensure_lyrics(&key).await.ok_or(LookupError::NotFound)
    }

    async fn lookup_upstream(&self, external_id: &str) -> Option<String> {
        if external_id.is_empty() {
            return None;
        }
        debug!("Song {} is not cached, asking the providers", external_id);

        for provider in self.enabled_providers() {
            if let Some(song) = provider.lookup(external_id).await {
                if let Some(key) = self.store.put(song) {
                    return Some(key);
                }
            }
        }

        for provider in self.enabled_providers() {
            let found = provider
                .search(external_id, ID_SEARCH_LIMIT)
                .await
                .into_iter()
                .find(|song| song.external_id.as_deref() == Some(external_id));
            if let Some(song) = found {
                if let Some(key) = self.store.put(song) {
                    return Some(key);
                }
            }
        }
        None
    }

    fn lyrics_lock(&self, key: &str) -> KeyLock {
        let mut locks = self.lyrics_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }

    fn release_lyrics_lock(&self, key: &str) {
        let mut locks = self.lyrics_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    async fn fetch_lyrics(&self, record: &SongRecord) -> LyricsResult<String> {
        if record.source == Source::Genius && self.lyrics.supports_url_lookup() {
            if let Some(url) = &record.url {
                if let Ok(text) = self.lyrics.get_lyrics_by_url(url).await {
                    return Ok(text);
                }
            }
        }
        self.lyrics
            .get_lyrics_by_metadata(&LyricsLookup::new(record.artist.as_str(), record.title.as_str()))
            .await
    }

    /// Fetch and transliterate lyrics for a song that is neither cached nor stored
    pub async fn lyrics_for(&self, title: &str, artist: &str) -> Option<Lyrics> {
        match self.lyrics.get_lyrics_by_metadata(&LyricsLookup::new(artist, title)).await {
            Ok(text) => Some(self.transliterator.process_lyrics(&text)),
            Err(e) => {
                debug!("No lyrics for {} - {}: {}", artist, title, e);
                None
            }
        }
    }

    /// Attach lyrics to a cached record unless it already has them.
    ///
    /// Calls for the same key are serialized, so concurrent requests
    /// fetch upstream once. Returns `None` when the key is not cached.
    pub async fn ensure_lyrics(&self, key: &str) -> Option<SongRecord> {
        let lock = self.lyrics_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.attach_lyrics(key).await
        };
        drop(lock);
        self.release_lyrics_lock(key);
        result
    }

    async fn attach_lyrics(&self, key: &str) -> Option<SongRecord> {
        let record = self.store.get(key)?;
        if record.has_lyrics() {
            return Some(record);
        }

        self.store
            .update(key, &mut |r: &mut SongRecord| r.lyrics_state = LyricsState::Fetching);

        match self.fetch_lyrics(&record).await {
            Ok(text) => {
                let lyrics = self.transliterator.process_lyrics(&text);
                info!("Attached lyrics to {}", record);
                let mut apply = |r: &mut SongRecord| r.set_lyrics(lyrics.clone());
                match self.store.update(key, &mut apply) {
                    Some(updated) => Some(updated),
                    None => {
                        let mut record = record;
                        apply(&mut record);
                        Some(record)
                    }
                }
            }
            Err(e) => {
                debug!("No lyrics for {}: {}", record, e);
                let updated = self
                    .store
                    .update(key, &mut |r: &mut SongRecord| r.lyrics_state = LyricsState::Absent);
                Some(updated.unwrap_or(record))
            }
        }
    }

    /// Music videos for a song, trying progressively looser queries
    pub async fn videos_for_song(&self, title: &str, artist: &str, limit: usize) -> Vec<VideoResult> {
        let Some(videos) = &self.videos else {
            return Vec::new();
        };

        let strategies = [
            format!("{} {} official", artist, title),
            format!("{} {} MV", artist, title),
            format!("{} {}", artist, title),
            format!("{} {}", title, artist),
            format!("{} {} official", title, artist),
            title.to_string(),
        ];
        for query in strategies.iter().map(|q| q.trim()).filter(|q| !q.is_empty()) {
            let results = videos.search_videos(query, limit).await;
            if !results.is_empty() {
                debug!("Found {} videos for '{}'", results.len(), query);
                return results;
            }
        }
        Vec::new()
    }

    /// Trending tracks of every enabled provider, cached like search results
    pub async fn trending(&self, limit: usize) -> Vec<SongRecord> {
        let providers = self.enabled_providers();
        let results = join_all(providers.iter().map(|p| p.trending(limit))).await;
        self.merge_and_cache(results, limit)
    }

    /// Titles matching a partial query, most frequent first
    pub fn suggestions(&self, query: &str, limit: usize) -> Vec<Suggestion> {
        let query = query.trim().to_lowercase();
        if query.chars().count() < MIN_SUGGESTION_CHARS {
            return Vec::new();
        }

        let mut groups: Vec<(Suggestion, usize)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for song in self.library_songs().into_iter().chain(self.store.records()) {
            let matches = song.title.to_lowercase().contains(&query)
                || song.artist.to_lowercase().contains(&query)
                || song.search_keywords().iter().any(|k| k.contains(&query));
            if !matches {
                continue;
            }
            match index.get(&song.title) {
                Some(&i) => groups[i].1 += 1,
                None => {
                    index.insert(song.title.clone(), groups.len());
                    groups.push((
                        Suggestion {
                            title: song.title,
                            artist: song.artist,
                        },
                        1,
                    ));
                }
            }
        }

        groups.sort_by(|(a, count_a), (b, count_b)| count_b.cmp(count_a).then_with(|| a.title.cmp(&b.title)));
        groups.into_iter().take(limit).map(|(suggestion, _)| suggestion).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::helpers::lyrics::LyricsError;
    use crate::helpers::songcache::SongCache;
    use crate::helpers::transliteration::TableTransliterator;

    struct StubTracks {
        name: &'static str,
        songs: Vec<SongRecord>,
        searches: AtomicUsize,
    }

    impl StubTracks {
        fn new(name: &'static str, songs: Vec<SongRecord>) -> Arc<Self> {
            Arc::new(StubTracks {
                name,
                songs,
                searches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TrackProvider for StubTracks {
        fn provider_name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _query: &str, limit: usize) -> Vec<SongRecord> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            self.songs.iter().take(limit).cloned().collect()
        }

        async fn trending(&self, limit: usize) -> Vec<SongRecord> {
            self.songs.iter().take(limit).cloned().collect()
        }
    }

    struct SlowLyrics {
        text: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LyricsProvider for SlowLyrics {
        async fn get_lyrics_by_metadata(&self, _lookup: &LyricsLookup) -> LyricsResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.text.map(|t| t.to_string()).ok_or(LyricsError::NotFound)
        }

        fn provider_name(&self) -> &'static str {
            "slow"
        }
    }

    fn song(source: Source, id: &str, title: &str, artist: &str) -> SongRecord {
        let mut song = SongRecord::new(title, artist, source);
        song.external_id = Some(id.to_string());
        song
    }

    fn lyrics(text: Option<&'static str>) -> Arc<SlowLyrics> {
        Arc::new(SlowLyrics {
            text,
            calls: AtomicUsize::new(0),
        })
    }

    fn aggregator(cache: &Arc<SongCache>, lyrics: &Arc<SlowLyrics>) -> SearchAggregator {
        SearchAggregator::new(cache.clone(), lyrics.clone(), Arc::new(TableTransliterator::new()))
    }

    #[tokio::test]
    async fn test_search_dedupes_in_provider_order() {
        let cache = Arc::new(SongCache::new(100));
        let spotify = StubTracks::new(
            "spotify",
            vec![song(Source::Spotify, "s1", "Lemon", "Kenshi Yonezu"), song(Source::Spotify, "s2", "Idol", "YOASOBI")],
        );
        let genius = StubTracks::new(
            "genius",
            vec![song(Source::Genius, "g1", "LEMON", "kenshi yonezu"), song(Source::Genius, "g2", "Pretender", "Official HIGE DANdism")],
        );
        let aggregator = aggregator(&cache, &lyrics(None)).with_provider(spotify).with_provider(genius);

        let songs = aggregator.search_multiple_sources("lemon", 10).await;
        let ids: Vec<&str> = songs.iter().filter_map(|s| s.external_id.as_deref()).collect();
        assert_eq!(ids, vec!["s1", "s2", "g2"]);
        assert_eq!(cache.len(), 3);

        assert_eq!(aggregator.search_multiple_sources("lemon", 2).await.len(), 2);
    }

    #[tokio::test]
    async fn test_get_external_song_attaches_lyrics_once() {
        let cache = Arc::new(SongCache::new(100));
        cache.put(song(Source::Spotify, "abc", "夜に駆ける", "YOASOBI"));
        let provider = lyrics(Some("君の声"));
        let aggregator = aggregator(&cache, &provider);

        let first = aggregator.get_external_song("abc").await.unwrap();
        assert_eq!(first.lyrics_state, LyricsState::Present);
        assert_eq!(first.lyrics.as_ref().unwrap().romaji, "kiminokoe");

        let second = aggregator.get_external_song("ext_abc").await.unwrap();
        let third = aggregator.get_external_song("spotify:abc").await.unwrap();
        assert_eq!(second.lyrics, first.lyrics);
        assert_eq!(third.lyrics, first.lyrics);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_fetch_once() {
        let cache = Arc::new(SongCache::new(100));
        cache.put(song(Source::Spotify, "abc", "夜に駆ける", "YOASOBI"));
        let provider = lyrics(Some("夢"));
        let aggregator = aggregator(&cache, &provider);

        let (a, b) = tokio::join!(aggregator.get_external_song("abc"), aggregator.get_external_song("abc"));
        assert!(a.unwrap().has_lyrics());
        assert!(b.unwrap().has_lyrics());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(aggregator.lyrics_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_lyrics_fetch_can_be_retried() {
        let cache = Arc::new(SongCache::new(100));
        cache.put(song(Source::Spotify, "abc", "Instrumental", "Nobody"));
        let provider = lyrics(None);
        let aggregator = aggregator(&cache, &provider);

        let song = aggregator.get_external_song("abc").await.unwrap();
        assert!(song.lyrics.is_none());
        assert_eq!(song.lyrics_state, LyricsState::Absent);

        aggregator.get_external_song("abc").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_id_without_live_lookup() {
        let cache = Arc::new(SongCache::new(100));
        let spotify = StubTracks::new("spotify", vec![song(Source::Spotify, "abc", "Idol", "YOASOBI")]);
        let aggregator = aggregator(&cache, &lyrics(None))
            .with_provider(spotify.clone())
            .with_live_lookup(false);

        assert_eq!(aggregator.get_external_song("abc").await, Err(LookupError::NotCached));
        assert_eq!(spotify.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_live_lookup_accepts_exact_id_only() {
        let cache = Arc::new(SongCache::new(100));
        let spotify = StubTracks::new("spotify", vec![song(Source::Spotify, "abc", "Idol", "YOASOBI")]);
        let aggregator = aggregator(&cache, &lyrics(None)).with_provider(spotify);

        let found = aggregator.get_external_song("ext_abc").await.unwrap();
        assert_eq!(found.title, "Idol");
        assert!(aggregator.find_cached("spotify:abc").is_some());

        assert_eq!(aggregator.get_external_song("zzz").await, Err(LookupError::NotFound));
    }

    #[tokio::test]
    async fn test_search_realtime_totals() {
        let cache = Arc::new(SongCache::new(100));
        let library = Arc::new(SongLibrary::in_memory().unwrap());
        library.save(SongRecord::new("Idol", "YOASOBI", Source::Local)).unwrap();
        let spotify = StubTracks::new("spotify", vec![song(Source::Spotify, "s1", "Idol", "YOASOBI")]);
        let aggregator = aggregator(&cache, &lyrics(None))
            .with_provider(spotify.clone())
            .with_library(library);

        let results = aggregator.search_realtime("idol", 20, true).await;
        assert_eq!(results.database.len(), 1);
        assert_eq!(results.external.len(), 1);
        assert_eq!(results.total, 2);

        let results = aggregator.search_realtime("idol", 20, false).await;
        assert_eq!(results.total, 1);
        assert_eq!(spotify.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_suggestions() {
        let cache = Arc::new(SongCache::new(100));
        cache.put(song(Source::Spotify, "s1", "Idol", "YOASOBI"));
        cache.put(song(Source::Genius, "g1", "Idol", "YOASOBI"));
        cache.put(song(Source::Spotify, "s2", "Ano Yume", "YOASOBI"));
        let spotify = StubTracks::new("spotify", Vec::new());
        let aggregator = aggregator(&cache, &lyrics(None)).with_provider(spotify.clone());

        assert!(aggregator.suggestions("y", 10).is_empty());
        assert!(aggregator.suggestions("  y  ", 10).is_empty());

        let suggestions = aggregator.suggestions("yoasobi", 10);
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].title, "Idol");
        assert_eq!(suggestions[1].title, "Ano Yume");
        assert_eq!(aggregator.suggestions("yoasobi", 1).len(), 1);
        assert_eq!(spotify.searches.load(Ordering::SeqCst), 0);
    }
}
