use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::Deserialize;

use crate::constants::BROWSER_USER_AGENT;
use crate::data::VideoResult;
use crate::helpers::http_client::HttpClient;
use crate::helpers::lyrics::html_to_text;
use crate::helpers::ratelimit::DEFAULT_RATE_LIMIT_MS;
use crate::providers::{ProviderClient, ProviderError, VideoProvider};

const YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const YOUTUBE_RESULTS_URL: &str = "https://www.youtube.com/results";

const MAX_SEARCH_LIMIT: usize = 50;

/// Bytes after a video id searched for its title and channel
const RENDERER_WINDOW: usize = 4000;

lazy_static! {
    static ref VIDEO_RENDERER: Regex = Regex::new(r#""videoRenderer":\{"videoId":"([A-Za-z0-9_-]{11})""#).unwrap();
    static ref RENDERER_TITLE: Regex = Regex::new(r#""title":\{"runs":\[\{"text":"((?:[^"\\]|\\.)*)""#).unwrap();
    static ref RENDERER_OWNER: Regex = Regex::new(r#""ownerText":\{"runs":\[\{"text":"((?:[^"\\]|\\.)*)""#).unwrap();
}

#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub enable: bool,
    pub api_key: Option<String>,
    pub rate_limit_ms: u64,
    pub scrape_fallback: bool,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        YouTubeConfig {
            enable: true,
            api_key: None,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            scrape_fallback: true,
        }
    }
}

impl YouTubeConfig {
    pub fn from_json(youtube_config: &serde_json::Value) -> Self {
        YouTubeConfig {
            enable: youtube_config.get("enable").and_then(|v| v.as_bool()).unwrap_or(true),
            api_key: youtube_config
                .get("api_key")
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.to_string()),
            rate_limit_ms: youtube_config
                .get("rate_limit_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_RATE_LIMIT_MS),
            scrape_fallback: youtube_config
                .get("scrape_fallback")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
        }
    }
}

#[derive(Debug, Deserialize)]
struct YouTubeSearchResponse {
    #[serde(default)]
    items: Vec<YouTubeItem>,
}

#[derive(Debug, Deserialize)]
struct YouTubeItem {
    id: YouTubeItemId,
    snippet: YouTubeSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YouTubeItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YouTubeSnippet {
    title: String,
    #[serde(default)]
    channel_title: String,
    thumbnails: Option<YouTubeThumbnails>,
}

#[derive(Debug, Deserialize)]
struct YouTubeThumbnails {
    medium: Option<YouTubeThumbnail>,
    default: Option<YouTubeThumbnail>,
}

#[derive(Debug, Deserialize)]
struct YouTubeThumbnail {
    url: String,
}

/// YouTube video search through the Data API with a results page scraper as fallback
pub struct YouTubeProvider {
    config: YouTubeConfig,
    client: ProviderClient,
}

impl YouTubeProvider {
    pub fn new(config: YouTubeConfig, http: Arc<dyn HttpClient>, retry_backoff: Duration) -> Self {
        let client = ProviderClient::new("youtube", http, config.rate_limit_ms, retry_backoff);
        YouTubeProvider { config, client }
    }

    async fn search_api(&self, api_key: &str, query: &str, limit: usize) -> Result<Vec<VideoResult>, ProviderError> {
        let url = format!(
            "{}?part=snippet&q={}&type=video&maxResults={}&key={}",
            YOUTUBE_API_URL,
            urlencoding::encode(query),
            limit.clamp(1, MAX_SEARCH_LIMIT),
            urlencoding::encode(api_key)
        );
        let response: YouTubeSearchResponse = serde_json::from_value(self.client.get_json(&url, &[]).await?)?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id.video_id?;
                let thumbnail = item
                    .snippet
                    .thumbnails
                    .and_then(|t| t.medium.or(t.default))
                    .map(|t| t.url);
                Some(VideoResult::youtube(
                    &id,
                    &html_to_text(&item.snippet.title),
                    &item.snippet.channel_title,
                    thumbnail,
                ))
            })
            .collect())
    }

    async fn search_scrape(&self, query: &str, limit: usize) -> Result<Vec<VideoResult>, ProviderError> {
        let url = format!("{}?search_query={}", YOUTUBE_RESULTS_URL, urlencoding::encode(query));
        let response = self.client.get(&url, &[("User-Agent", BROWSER_USER_AGENT)]).await?;
        Ok(parse_results_page(&response.body, limit))
    }
}

/// Extract videos from the JSON embedded in a YouTube results page
pub fn parse_results_page(html: &str, limit: usize) -> Vec<VideoResult> {
    let mut seen = HashSet::new();
    let mut videos = Vec::new();

    for caps in VIDEO_RENDERER.captures_iter(html) {
        if videos.len() >= limit {
            break;
        }
        let id = &caps[1];
        if !seen.insert(id.to_string()) {
            continue;
        }

        let Some(renderer) = caps.get(0) else { continue };
        let mut end = (renderer.end() + RENDERER_WINDOW).min(html.len());
        while !html.is_char_boundary(end) {
            end -= 1;
        }
        let window = &html[renderer.end()..end];

        let title = RENDERER_TITLE
            .captures(window)
            .and_then(|c| unescape_json_string(&c[1]))
            .unwrap_or_default();
        let channel = RENDERER_OWNER
            .captures(window)
            .and_then(|c| unescape_json_string(&c[1]))
            .unwrap_or_default();
        let thumbnail = format!("https://i.ytimg.com/vi/{}/mqdefault.jpg", id);

        videos.push(VideoResult::youtube(id, &title, &channel, Some(thumbnail)));
    }
    videos
}

fn unescape_json_string(raw: &str) -> Option<String> {
    serde_json::from_str(&format!("\"{}\"", raw)).ok()
}

#[async_trait]
impl VideoProvider for YouTubeProvider {
    fn provider_name(&self) -> &'static str {
        "youtube"
    }

    async fn search_videos(&self, query: &str, limit: usize) -> Vec<VideoResult> {
        if !self.config.enable {
            return Vec::new();
        }

        if let Some(api_key) = self.config.api_key.as_deref() {
            match self.search_api(api_key, query, limit).await {
                Ok(videos) => {
                    debug!("YouTube API returned {} videos for '{}'", videos.len(), query);
                    return videos;
                }
                Err(e) => warn!("YouTube API search for '{}' failed: {}", query, e),
            }
        }

        if !self.config.scrape_fallback {
            return Vec::new();
        }
        match self.search_scrape(query, limit).await {
            Ok(videos) => {
                debug!("YouTube results page yielded {} videos for '{}'", videos.len(), query);
                videos
            }
            Err(e) => {
                warn!("YouTube results page search for '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }
}
