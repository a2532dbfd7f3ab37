use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::Datelike;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::data::{parse_release_year, SongRecord, Source};
use crate::helpers::http_client::HttpClient;
use crate::helpers::ratelimit::DEFAULT_RATE_LIMIT_MS;
use crate::providers::{ProviderClient, ProviderError, TrackProvider};

const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

/// Maximum page size accepted by the search endpoint
const MAX_SEARCH_LIMIT: usize = 50;

/// Tokens are refreshed this long before they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Spotify configuration structure
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub enable: bool,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub rate_limit_ms: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        SpotifyConfig {
            enable: true,
            client_id: None,
            client_secret: None,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
        }
    }
}

impl SpotifyConfig {
    pub fn from_json(spotify_config: &serde_json::Value) -> Self {
        let non_empty = |key: &str| {
            spotify_config
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string())
        };
        SpotifyConfig {
            enable: spotify_config.get("enable").and_then(|v| v.as_bool()).unwrap_or(true),
            client_id: non_empty("client_id"),
            client_secret: non_empty("client_secret"),
            rate_limit_ms: spotify_config
                .get("rate_limit_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_RATE_LIMIT_MS),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct SpotifyTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyPaging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct SpotifySearchResponse {
    tracks: Option<SpotifyPaging<SpotifyTrack>>,
}

#[derive(Debug, Deserialize)]
struct SpotifyFeaturedPlaylists {
    playlists: SpotifyPaging<SpotifyPlaylist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyPlaylist {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyPlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    album: Option<SpotifyAlbum>,
    popularity: Option<u64>,
    duration_ms: Option<u64>,
    preview_url: Option<String>,
    external_urls: Option<SpotifyExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    name: String,
    release_date: Option<String>,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyExternalUrls {
    spotify: Option<String>,
}

impl SpotifyTrack {
    fn into_song(self) -> SongRecord {
        let artist = self
            .artists
            .first()
            .map(|a| a.name.clone())
            .unwrap_or_else(|| "Unknown Artist".to_string());
        let mut song = SongRecord::new(self.name, artist, Source::Spotify);

        match self.album {
            Some(album) => {
                song.album = album.name;
                song.year = album.release_date.as_deref().and_then(parse_release_year);
                song.image_url = album.images.into_iter().next().map(|i| i.url);
            }
            None => song.album = "Unknown Album".to_string(),
        }
        if song.year.is_none() {
            song.year = Some(chrono::Utc::now().year());
        }

        song.external_id = self.id;
        song.popularity = self.popularity.unwrap_or(0);
        song.metadata.duration = self.duration_ms.map(|ms| (ms / 1000) as u32);
        song.preview_url = self.preview_url;
        song.url = self.external_urls.and_then(|u| u.spotify);
        song
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Spotify Web API adapter using the client credentials flow
pub struct SpotifyProvider {
    config: SpotifyConfig,
    client: ProviderClient,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyProvider {
    pub fn new(config: SpotifyConfig, http: Arc<dyn HttpClient>, retry_backoff: Duration) -> Self {
        let client = ProviderClient::new("spotify", http, config.rate_limit_ms, retry_backoff);
        SpotifyProvider {
            config,
            client,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut token = self.token.lock().await;
        if let Some(cached) = token.as_ref() {
            if cached.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN {
                return Ok(cached.access_token.clone());
            }
        }

        let (client_id, client_secret) = match (&self.config.client_id, &self.config.client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => return Err(ProviderError::NotConfigured("spotify")),
        };

        debug!("Requesting new Spotify access token");
        let credentials = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret));
        let authorization = format!("Basic {}", credentials);
        let response = self
            .client
            .http()
            .post_form(
                SPOTIFY_TOKEN_URL,
                &[("Authorization", authorization.as_str())],
                &[("grant_type", "client_credentials")],
            )
            .await?;

        if !response.is_success() {
            return Err(ProviderError::Auth(format!("token request failed with HTTP {}", response.status)));
        }

        let parsed: SpotifyTokenResponse = serde_json::from_str(&response.body)?;
        info!("Obtained Spotify access token, valid for {}s", parsed.expires_in);
        *token = Some(CachedToken {
            access_token: parsed.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        });
        Ok(parsed.access_token)
    }

    async fn api_get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ProviderError> {
        let token = self.access_token().await?;
        let authorization = format!("Bearer {}", token);

        match self.client.get_json(url, &[("Authorization", authorization.as_str())]).await {
            Ok(json) => Ok(serde_json::from_value(json)?),
            Err(ProviderError::Status(401)) => {
                *self.token.lock().await = None;
                Err(ProviderError::Auth("access token rejected".to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<SongRecord>, ProviderError> {
        let url = format!(
            "{}/search?q={}&type=track&limit={}",
            SPOTIFY_API_URL,
            urlencoding::encode(query),
            limit.clamp(1, MAX_SEARCH_LIMIT)
        );
        let response: SpotifySearchResponse = self.api_get(&url).await?;
        let tracks = response.tracks.map(|t| t.items).unwrap_or_default();
        Ok(tracks.into_iter().map(SpotifyTrack::into_song).collect())
    }

    async fn try_trending(&self, limit: usize) -> Result<Vec<SongRecord>, ProviderError> {
        let url = format!("{}/browse/featured-playlists?limit=1", SPOTIFY_API_URL);
        let featured: SpotifyFeaturedPlaylists = self.api_get(&url).await?;
        let playlist = match featured.playlists.items.into_iter().next() {
            Some(playlist) => playlist,
            None => return Ok(Vec::new()),
        };

        let url = format!(
            "{}/playlists/{}/tracks?limit={}",
            SPOTIFY_API_URL,
            urlencoding::encode(&playlist.id),
            limit.clamp(1, MAX_SEARCH_LIMIT)
        );
        let items: SpotifyPaging<SpotifyPlaylistItem> = self.api_get(&url).await?;
        Ok(items
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .map(SpotifyTrack::into_song)
            .collect())
    }
}

#[async_trait]
impl TrackProvider for SpotifyProvider {
    fn provider_name(&self) -> &'static str {
        "spotify"
    }

    fn is_enabled(&self) -> bool {
        self.config.enable && self.config.has_credentials()
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<SongRecord> {
        if !self.is_enabled() {
            debug!("Spotify is disabled or has no credentials, skipping search");
            return Vec::new();
        }
        match self.try_search(query, limit).await {
            Ok(songs) => {
                debug!("Spotify returned {} tracks for '{}'", songs.len(), query);
                songs
            }
            Err(e) => {
                warn!("Spotify search for '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }

    async fn lookup(&self, external_id: &str) -> Option<SongRecord> {
        if !self.is_enabled() {
            return None;
        }
        let url = format!("{}/tracks/{}", SPOTIFY_API_URL, urlencoding::encode(external_id));
        match self.api_get::<SpotifyTrack>(&url).await {
            Ok(track) => Some(track.into_song()),
            Err(e) => {
                debug!("Spotify track lookup for {} failed: {}", external_id, e);
                None
            }
        }
    }

    async fn trending(&self, limit: usize) -> Vec<SongRecord> {
        if !self.is_enabled() {
            return Vec::new();
        }
        self.try_trending(limit).await.unwrap_or_else(|e| {
            warn!("Spotify trending lookup failed: {}", e);
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::http_client::mock::MockHttpClient;
    use serde_json::json;

    const TOKEN: &str = r#"{"access_token": "tok", "token_type": "Bearer", "expires_in": 3600}"#;

    fn search_body() -> String {
        json!({
            "tracks": {
                "items": [
                    {
                        "id": "3dPtXHP0oXQ4HCWHsOA9js",
                        "name": "夜に駆ける",
                        "artists": [{"name": "YOASOBI"}],
                        "album": {
                            "name": "THE BOOK",
                            "release_date": "2021-01-06",
                            "images": [{"url": "https://i.scdn.co/image/large"}, {"url": "https://i.scdn.co/image/small"}]
                        },
                        "popularity": 74,
                        "duration_ms": 261000,
                        "preview_url": null,
                        "external_urls": {"spotify": "https://open.spotify.com/track/3dPtXHP0oXQ4HCWHsOA9js"}
                    },
                    {
                        "id": "x",
                        "name": "No Artist",
                        "artists": []
                    }
                ]
            }
        })
        .to_string()
    }

    fn provider(mock: &Arc<MockHttpClient>) -> SpotifyProvider {
        let config = SpotifyConfig {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            rate_limit_ms: 0,
            ..Default::default()
        };
        SpotifyProvider::new(config, mock.clone(), Duration::from_millis(10))
    }

    #[test]
    fn test_config_from_json() {
        let config = SpotifyConfig::from_json(&json!({"client_id": "abc", "client_secret": " ", "rate_limit_ms": 250}));
        assert!(config.enable);
        assert_eq!(config.client_id.as_deref(), Some("abc"));
        assert_eq!(config.client_secret, None);
        assert!(!config.has_credentials());
        assert_eq!(config.rate_limit_ms, 250);
    }

    #[tokio::test]
    async fn test_search_maps_tracks() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond("accounts.spotify.com", 200, TOKEN);
        mock.respond("/v1/search", 200, &search_body());

        let songs = provider(&mock).search("yoasobi", 5).await;
        assert_eq!(songs.len(), 2);

        let song = &songs[0];
        assert_eq!(song.title, "夜に駆ける");
        assert_eq!(song.artist, "YOASOBI");
        assert_eq!(song.album, "THE BOOK");
        assert_eq!(song.year, Some(2021));
        assert_eq!(song.genre, "J-POP");
        assert_eq!(song.source, Source::Spotify);
        assert_eq!(song.external_id.as_deref(), Some("3dPtXHP0oXQ4HCWHsOA9js"));
        assert_eq!(song.popularity, 74);
        assert_eq!(song.metadata.duration, Some(261));
        assert_eq!(song.image_url.as_deref(), Some("https://i.scdn.co/image/large"));
        assert!(song.lyrics.is_none());

        let fallback = &songs[1];
        assert_eq!(fallback.artist, "Unknown Artist");
        assert_eq!(fallback.album, "Unknown Album");
        assert_eq!(fallback.popularity, 0);
        assert!(fallback.year.is_some());
    }

    #[tokio::test]
    async fn test_token_is_reused() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond("accounts.spotify.com", 200, TOKEN);
        mock.respond("/v1/search", 200, &search_body());

        let spotify = provider(&mock);
        spotify.search("a", 5).await;
        spotify.search("b", 5).await;
        assert_eq!(mock.calls_to("accounts.spotify.com"), 1);
        assert_eq!(mock.calls_to("/v1/search"), 2);
    }

    #[tokio::test]
    async fn test_search_fails_soft() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond("accounts.spotify.com", 400, r#"{"error": "invalid_client"}"#);

        assert!(provider(&mock).search("yoasobi", 5).await.is_empty());
        assert_eq!(mock.calls_to("/v1/search"), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_twice_returns_empty() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond("accounts.spotify.com", 200, TOKEN);
        mock.respond("/v1/search", 429, "");

        assert!(provider(&mock).search("yoasobi", 5).await.is_empty());
        assert_eq!(mock.calls_to("/v1/search"), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_makes_no_calls() {
        let mock = Arc::new(MockHttpClient::new());
        let spotify = SpotifyProvider::new(SpotifyConfig::default(), mock.clone(), Duration::from_millis(10));

        assert!(!spotify.is_enabled());
        assert!(spotify.search("yoasobi", 5).await.is_empty());
        assert!(spotify.lookup("abc").await.is_none());
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_lookup() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond("accounts.spotify.com", 200, TOKEN);
        mock.respond("/v1/tracks/abc", 200, r#"{"id": "abc", "name": "Lemon", "artists": [{"name": "米津玄師"}]}"#);
        mock.respond("/v1/tracks/missing", 404, r#"{"error": {"status": 404}}"#);

        let spotify = provider(&mock);
        let song = spotify.lookup("abc").await.unwrap();
        assert_eq!(song.title, "Lemon");
        assert!(spotify.lookup("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_trending() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond("accounts.spotify.com", 200, TOKEN);
        mock.respond("featured-playlists", 200, r#"{"playlists": {"items": [{"id": "pl1"}]}}"#);
        mock.respond(
            "/playlists/pl1/tracks",
            200,
            r#"{"items": [{"track": {"id": "t1", "name": "Idol", "artists": [{"name": "YOASOBI"}]}}, {"track": null}]}"#,
        );

        let songs = provider(&mock).trending(10).await;
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].title, "Idol");
    }
}
