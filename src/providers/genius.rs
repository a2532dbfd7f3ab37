use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use log::{debug, warn};
use serde::Deserialize;

use crate::constants::BROWSER_USER_AGENT;
use crate::data::{SongRecord, Source};
use crate::helpers::http_client::HttpClient;
use crate::helpers::lyrics::{
    extract_lyrics_from_html, LyricsError, LyricsLookup, LyricsProvider, LyricsResult, DEFAULT_MIN_LYRICS_LENGTH,
};
use crate::helpers::ratelimit::DEFAULT_RATE_LIMIT_MS;
use crate::providers::{ProviderClient, ProviderError, TrackProvider};

const GENIUS_API_URL: &str = "https://api.genius.com";

const MAX_SEARCH_LIMIT: usize = 50;

/// Album name used for search hits, the search endpoint does not return albums
const SEARCH_RESULT_ALBUM: &str = "Genius Result";

#[derive(Debug, Clone)]
pub struct GeniusConfig {
    pub enable: bool,
    pub api_key: Option<String>,
    pub rate_limit_ms: u64,
}

impl Default for GeniusConfig {
    fn default() -> Self {
        GeniusConfig {
            enable: true,
            api_key: None,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
        }
    }
}

impl GeniusConfig {
    pub fn from_json(genius_config: &serde_json::Value) -> Self {
        GeniusConfig {
            enable: genius_config.get("enable").and_then(|v| v.as_bool()).unwrap_or(true),
            api_key: genius_config
                .get("api_key")
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string()),
            rate_limit_ms: genius_config
                .get("rate_limit_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_RATE_LIMIT_MS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeniusEnvelope<T> {
    response: T,
}

#[derive(Debug, Deserialize)]
struct GeniusSearchResponse {
    #[serde(default)]
    hits: Vec<GeniusHit>,
}

#[derive(Debug, Deserialize)]
struct GeniusHit {
    result: GeniusSong,
}

#[derive(Debug, Deserialize)]
struct GeniusSongResponse {
    song: GeniusSong,
}

#[derive(Debug, Deserialize)]
struct GeniusSong {
    id: u64,
    title: String,
    url: Option<String>,
    song_art_image_url: Option<String>,
    primary_artist: Option<GeniusArtist>,
    album: Option<GeniusAlbum>,
    stats: Option<GeniusStats>,
    release_date_components: Option<GeniusReleaseDate>,
}

#[derive(Debug, Deserialize)]
struct GeniusArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GeniusAlbum {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GeniusStats {
    pageviews: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GeniusReleaseDate {
    year: Option<i32>,
}

impl GeniusSong {
    fn into_song(self) -> SongRecord {
        let artist = self
            .primary_artist
            .map(|a| a.name)
            .unwrap_or_else(|| "Unknown Artist".to_string());
        let mut song = SongRecord::new(self.title, artist, Source::Genius);
        song.album = self
            .album
            .map(|a| a.name)
            .unwrap_or_else(|| SEARCH_RESULT_ALBUM.to_string());
        song.year = Some(
            self.release_date_components
                .and_then(|d| d.year)
                .unwrap_or_else(|| chrono::Utc::now().year()),
        );
        song.external_id = Some(self.id.to_string());
        song.popularity = self.stats.and_then(|s| s.pageviews).unwrap_or(0);
        song.image_url = self.song_art_image_url;
        song.url = self.url;
        song
    }
}

/// Genius API adapter
pub struct GeniusProvider {
    config: GeniusConfig,
    client: ProviderClient,
}

impl GeniusProvider {
    pub fn new(config: GeniusConfig, http: Arc<dyn HttpClient>, retry_backoff: Duration) -> Self {
        let client = ProviderClient::new("genius", http, config.rate_limit_ms, retry_backoff);
        GeniusProvider { config, client }
    }

    async fn api_get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ProviderError> {
        let api_key = self.config.api_key.as_deref().ok_or(ProviderError::NotConfigured("genius"))?;
        let authorization = format!("Bearer {}", api_key);
        let json = self.client.get_json(url, &[("Authorization", authorization.as_str())]).await?;
        let envelope: GeniusEnvelope<T> = serde_json::from_value(json)?;
        Ok(envelope.response)
    }

    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<SongRecord>, ProviderError> {
        let url = format!(
            "{}/search?q={}&per_page={}",
            GENIUS_API_URL,
            urlencoding::encode(query),
            limit.clamp(1, MAX_SEARCH_LIMIT)
        );
        let response: GeniusSearchResponse = self.api_get(&url).await?;
        Ok(response.hits.into_iter().map(|hit| hit.result.into_song()).collect())
    }

    /// URL of the Genius page of the best matching song
    ///
    /// A hit whose title matches case-insensitively is preferred,
    /// otherwise the first hit is used.
    pub async fn find_song_url(&self, title: &str, artist: &str) -> Result<Option<String>, ProviderError> {
        if !self.is_enabled() {
            return Err(ProviderError::NotConfigured("genius"));
        }
        let songs = self.try_search(&format!("{} {}", title, artist), 5).await?;
        let wanted = title.trim().to_lowercase();
        let best = songs
            .iter()
            .find(|song| song.title.trim().to_lowercase() == wanted)
            .or_else(|| songs.first());
        Ok(best.and_then(|song| song.url.clone()))
    }

    /// Download a song page without rate limiting, pages are not API calls
    async fn fetch_page(&self, url: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .http()
            .get(url, &[("User-Agent", BROWSER_USER_AGENT)])
            .await?;
        if !response.is_success() {
            return Err(ProviderError::Status(response.status));
        }
        Ok(response.body)
    }
}

#[async_trait]
impl TrackProvider for GeniusProvider {
    fn provider_name(&self) -> &'static str {
        "genius"
    }

    fn is_enabled(&self) -> bool {
        self.config.enable && self.config.api_key.is_some()
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<SongRecord> {
        if !self.is_enabled() {
            debug!("Genius is disabled or has no API key, skipping search");
            return Vec::new();
        }
        match self.try_search(query, limit).await {
            Ok(songs) => {
                debug!("Genius returned {} hits for '{}'", songs.len(), query);
                songs
            }
            Err(e) => {
                warn!("Genius search for '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }

    async fn lookup(&self, external_id: &str) -> Option<SongRecord> {
        if !self.is_enabled() || !external_id.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let url = format!("{}/songs/{}", GENIUS_API_URL, external_id);
        match self.api_get::<GeniusSongResponse>(&url).await {
            Ok(response) => Some(response.song.into_song()),
            Err(e) => {
                debug!("Genius song lookup for {} failed: {}", external_id, e);
                None
            }
        }
    }
}

/// Lyrics scraped from Genius song pages
pub struct GeniusLyricsProvider {
    genius: Arc<GeniusProvider>,
    min_length: usize,
}

impl GeniusLyricsProvider {
    pub fn new(genius: Arc<GeniusProvider>) -> Self {
        GeniusLyricsProvider {
            genius,
            min_length: DEFAULT_MIN_LYRICS_LENGTH,
        }
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }
}

#[async_trait]
impl LyricsProvider for GeniusLyricsProvider {
    async fn get_lyrics_by_metadata(&self, lookup: &LyricsLookup) -> LyricsResult<String> {
        let url = self
            .genius
            .find_song_url(&lookup.title, &lookup.artist)
            .await?
            .ok_or(LyricsError::NotFound)?;
        self.get_lyrics_by_url(&url).await
    }

    async fn get_lyrics_by_url(&self, url: &str) -> LyricsResult<String> {
        debug!("Scraping lyrics from {}", url);
        let html = self.genius.fetch_page(url).await?;
        extract_lyrics_from_html(&html, self.min_length).ok_or(LyricsError::NotFound)
    }

    fn provider_name(&self) -> &'static str {
        "genius"
    }

    fn supports_url_lookup(&self) -> bool {
        true
    }
}
