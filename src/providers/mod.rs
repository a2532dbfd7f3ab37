//! Adapters for the third-party music services.
//!
//! Track and video providers fail soft: errors are logged and turned into
//! empty results, so one broken service never fails a whole search.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use thiserror::Error;

use crate::data::{SongRecord, VideoResult};
use crate::helpers::http_client::{HttpClient, HttpClientError, HttpResponse};
use crate::helpers::lyrics::LyricsError;
use crate::helpers::ratelimit::RateLimiter;
use crate::helpers::retry::RetryHandler;

pub mod genius;
pub mod lyricsovh;
pub mod spotify;
pub mod youtube;

pub use genius::{GeniusConfig, GeniusLyricsProvider, GeniusProvider};
pub use lyricsovh::LyricsOvhProvider;
pub use spotify::{SpotifyConfig, SpotifyProvider};
pub use youtube::{YouTubeConfig, YouTubeProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] HttpClientError),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Still rate limited after retry")]
    RateLimited,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unexpected response: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(error: serde_json::Error) -> Self {
        ProviderError::Parse(error.to_string())
    }
}

impl From<ProviderError> for LyricsError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Status(404) => LyricsError::NotFound,
            ProviderError::NotConfigured(name) => LyricsError::NotConfigured(name.to_string()),
            ProviderError::Parse(msg) => LyricsError::ParseError(msg),
            other => LyricsError::NetworkError(other.to_string()),
        }
    }
}

/// Searches a music service for tracks
#[async_trait]
pub trait TrackProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Whether the provider is enabled and has credentials
    fn is_enabled(&self) -> bool {
        true
    }

    /// Search for tracks. Never fails; errors yield an empty list.
    async fn search(&self, query: &str, limit: usize) -> Vec<SongRecord>;

    /// Fetch a single track by the provider's id
    async fn lookup(&self, _external_id: &str) -> Option<SongRecord> {
        None
    }

    /// Currently popular tracks, if the service offers such a list
    async fn trending(&self, _limit: usize) -> Vec<SongRecord> {
        Vec::new()
    }
}

/// Searches a video service for music videos
#[async_trait]
pub trait VideoProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn search_videos(&self, query: &str, limit: usize) -> Vec<VideoResult>;
}

/// HTTP access for one provider: rate limit gate, single retry on HTTP 429
#[derive(Debug)]
pub struct ProviderClient {
    name: &'static str,
    http: Arc<dyn HttpClient>,
    limiter: RateLimiter,
    retry_backoff: Duration,
}

impl ProviderClient {
    pub fn new(name: &'static str, http: Arc<dyn HttpClient>, rate_limit_ms: u64, retry_backoff: Duration) -> Self {
        ProviderClient {
            name,
            http,
            limiter: RateLimiter::new(name, rate_limit_ms),
            retry_backoff,
        }
    }

    /// The underlying client, bypassing rate limiting
    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    /// Send a GET request, returning only successful responses
    pub async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, ProviderError> {
        let mut retry = RetryHandler::rate_limit_retry(self.retry_backoff);
        loop {
            self.limiter.wait().await;
            let response = self.http.get(url, headers).await?;

            if response.is_rate_limited() {
                if retry.should_retry() {
                    warn!("{} rate limited (HTTP 429), retrying in {:?}", self.name, retry.get_delay());
                    retry.wait().await;
                    continue;
                }
                return Err(ProviderError::RateLimited);
            }

            if !response.is_success() {
                return Err(ProviderError::Status(response.status));
            }
            return Ok(response);
        }
    }

    pub async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, ProviderError> {
        Ok(self.get(url, headers).await?.json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::http_client::mock::MockHttpClient;

    fn client(mock: &Arc<MockHttpClient>) -> ProviderClient {
        ProviderClient::new("test", mock.clone(), 0, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_retries_once_after_rate_limit() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond("/search", 429, "");
        mock.respond("/search", 200, r#"{"ok": true}"#);

        let value = client(&mock).get_json("https://api.test/search", &[]).await.unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(mock.calls_to("/search"), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_second_rate_limit() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond("/search", 429, "");

        let result = client(&mock).get_json("https://api.test/search", &[]).await;
        assert!(matches!(result, Err(ProviderError::RateLimited)));
        assert_eq!(mock.calls_to("/search"), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond("/search", 500, "oops");

        let result = client(&mock).get("https://api.test/search", &[]).await;
        assert!(matches!(result, Err(ProviderError::Status(500))));
        assert_eq!(mock.calls_to("/search"), 1);
    }

    #[test]
    fn test_lyrics_error_mapping() {
        assert!(matches!(LyricsError::from(ProviderError::Status(404)), LyricsError::NotFound));
        assert!(matches!(LyricsError::from(ProviderError::RateLimited), LyricsError::NetworkError(_)));
    }
}
