// Common helpers for the API integration tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rocket::local::asynchronous::Client;

use kashifind::api::server::build_rocket;
use kashifind::api::AppState;
use kashifind::config::AppConfig;
use kashifind::data::{SongRecord, Source, VideoResult};
use kashifind::helpers::lyrics::{LyricsLookup, LyricsProvider, LyricsResult};
use kashifind::helpers::songcache::{SongCache, SongStore};
use kashifind::helpers::songlibrary::SongLibrary;
use kashifind::helpers::transliteration::{TableTransliterator, Transliterator};
use kashifind::providers::{TrackProvider, VideoProvider};
use kashifind::search::SearchAggregator;

pub use serial_test::serial;

/// Track provider returning a fixed list for every query
pub struct StubTracks {
    name: &'static str,
    songs: Vec<SongRecord>,
    pub searches: AtomicUsize,
}

impl StubTracks {
    pub fn new(name: &'static str, songs: Vec<SongRecord>) -> Arc<Self> {
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
}

/// Lyrics provider that knows every song
pub struct StubLyrics {
    text: String,
    pub calls: AtomicUsize,
}

impl StubLyrics {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(StubLyrics {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LyricsProvider for StubLyrics {
    async fn get_lyrics_by_metadata(&self, _lookup: &LyricsLookup) -> LyricsResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }

    fn provider_name(&self) -> &'static str {
        "stub"
    }
}

pub struct StubVideos;

#[async_trait]
impl VideoProvider for StubVideos {
    fn provider_name(&self) -> &'static str {
        "stub"
    }

    async fn search_videos(&self, query: &str, _limit: usize) -> Vec<VideoResult> {
        vec![VideoResult::youtube("x8VYWazR5mE", query, "Ayase / YOASOBI", None)]
    }
}

pub fn song(source: Source, external_id: &str, title: &str, artist: &str) -> SongRecord {
    let mut song = SongRecord::new(title, artist, source);
    song.external_id = Some(external_id.to_string());
    song.album = "THE BOOK".to_string();
    song.year = Some(2021);
    song
}

/// Songs of the two stub providers; the Genius copy of 夜に駆ける is a duplicate
pub fn provider_songs() -> (Vec<SongRecord>, Vec<SongRecord>) {
    let spotify = vec![
        song(Source::Spotify, "sp1", "夜に駆ける", "YOASOBI"),
        song(Source::Spotify, "sp2", "群青", "YOASOBI"),
    ];
    let genius = vec![song(Source::Genius, "5001", "夜に駆ける", "yoasobi")];
    (spotify, genius)
}

pub struct TestApp {
    pub client: Client,
    pub cache: Arc<SongCache>,
    pub tracks: Arc<StubTracks>,
    pub lyrics: Arc<StubLyrics>,
}

/// Application state around stub providers and an in-memory library
pub fn test_state(
    cache: Arc<SongCache>,
    providers: Vec<Arc<StubTracks>>,
    lyrics: Arc<StubLyrics>,
    live_lookup: bool,
) -> AppState {
    let library = Arc::new(SongLibrary::in_memory().expect("in-memory library"));
    let transliterator: Arc<dyn Transliterator> = Arc::new(TableTransliterator::new());
    let store: Arc<dyn SongStore> = cache.clone();

    let mut aggregator = SearchAggregator::new(store, lyrics, transliterator.clone())
        .with_video_provider(Arc::new(StubVideos))
        .with_library(library.clone())
        .with_live_lookup(live_lookup);
    for provider in providers {
        aggregator = aggregator.with_provider(provider);
    }

    let mut config = AppConfig::default();
    if let Some(path) = cache.snapshot_path() {
        config.cache.file = path.to_path_buf();
    }

    AppState {
        aggregator: Arc::new(aggregator),
        library,
        cache,
        transliterator,
        config,
    }
}

/// Start a local client; the cache is loaded from `snapshot` if it exists
pub async fn start_app(snapshot: &Path, live_lookup: bool) -> TestApp {
    let cache = Arc::new(SongCache::with_snapshot(100, snapshot));
    cache.load_snapshot().expect("snapshot load");

    let (spotify, genius) = provider_songs();
    let tracks = StubTracks::new("spotify", spotify);
    let lyrics = StubLyrics::new("夢");
    let state = test_state(
        cache.clone(),
        vec![tracks.clone(), StubTracks::new("genius", genius)],
        lyrics.clone(),
        live_lookup,
    );

    let client = Client::tracked(build_rocket(state))
        .await
        .expect("valid rocket instance");
    TestApp {
        client,
        cache,
        tracks,
        lyrics,
    }
}
