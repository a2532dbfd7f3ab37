use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::helpers::http_client::HttpClient;
use crate::helpers::lyrics::{
    clean_lyrics, is_substantial, LyricsError, LyricsLookup, LyricsProvider, LyricsResult, DEFAULT_MIN_LYRICS_LENGTH,
};
use crate::providers::{ProviderClient, ProviderError};

const LYRICS_OVH_URL: &str = "https://api.lyrics.ovh/v1";

/// lyrics.ovh needs no credentials and has no published limit
const LYRICS_OVH_RATE_LIMIT_MS: u64 = 0;

/// Lyrics lookup by artist and title on lyrics.ovh
pub struct LyricsOvhProvider {
    client: ProviderClient,
    min_length: usize,
}

impl LyricsOvhProvider {
    pub fn new(http: Arc<dyn HttpClient>, retry_backoff: Duration) -> Self {
        LyricsOvhProvider {
            client: ProviderClient::new("lyrics.ovh", http, LYRICS_OVH_RATE_LIMIT_MS, retry_backoff),
            min_length: DEFAULT_MIN_LYRICS_LENGTH,
        }
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }
}

#[async_trait]
impl LyricsProvider for LyricsOvhProvider {
    async fn get_lyrics_by_metadata(&self, lookup: &LyricsLookup) -> LyricsResult<String> {
        let url = format!(
            "{}/{}/{}",
            LYRICS_OVH_URL,
            urlencoding::encode(&lookup.artist),
            urlencoding::encode(&lookup.title)
        );
        let json = self.client.get_json(&url, &[]).await.map_err(LyricsError::from)?;

        let text = json
            .get("lyrics")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LyricsError::from(ProviderError::Parse("missing lyrics field".to_string())))?;
        let cleaned = clean_lyrics(text);
        if !is_substantial(&cleaned, self.min_length) {
            debug!("lyrics.ovh text for '{}' is too short", lookup.title);
            return Err(LyricsError::NotFound);
        }
        Ok(cleaned)
    }

    fn provider_name(&self) -> &'static str {
        "lyrics.ovh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::http_client::mock::MockHttpClient;

    fn provider(mock: &Arc<MockHttpClient>) -> LyricsOvhProvider {
        LyricsOvhProvider::new(mock.clone(), Duration::from_millis(10)).with_min_length(10)
    }

    #[tokio::test]
    async fn test_lyrics_found() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond(
            "/v1/YOASOBI/",
            200,
            r#"{"lyrics": "[Intro]\n沈むように溶けてゆくように\n\n\n二人だけの空が広がる夜に"}"#,
        );

        let lyrics = provider(&mock)
            .get_lyrics_by_metadata(&LyricsLookup::new("YOASOBI", "夜に駆ける"))
            .await
            .unwrap();
        assert_eq!(lyrics, "沈むように溶けてゆくように\n\n二人だけの空が広がる夜に");
    }

    #[tokio::test]
    async fn test_not_found_and_short_text() {
        let mock = Arc::new(MockHttpClient::new());
        mock.respond("/v1/Nobody/", 404, r#"{"error": "No lyrics found"}"#);
        mock.respond("/v1/Short/", 200, r#"{"lyrics": "la la"}"#);

        let lyricsovh = provider(&mock);
        let missing = lyricsovh.get_lyrics_by_metadata(&LyricsLookup::new("Nobody", "Song")).await;
        assert!(matches!(missing, Err(LyricsError::NotFound)));

        let short = lyricsovh.get_lyrics_by_metadata(&LyricsLookup::new("Short", "Song")).await;
        assert!(matches!(short, Err(LyricsError::NotFound)));
    }
}
