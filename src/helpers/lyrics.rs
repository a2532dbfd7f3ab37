//! Lyrics provider trait, composite provider and lyrics text utilities

use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::helpers::http_client::HttpClientError;

/// Scraped or fetched text at or below this many characters is not treated as lyrics
pub const DEFAULT_MIN_LYRICS_LENGTH: usize = 50;

/// Result type for lyrics operations
pub type LyricsResult<T> = Result<T, LyricsError>;

/// Error type for lyrics operations
#[derive(Debug)]
pub enum LyricsError {
    /// Song not found
    NotFound,
    /// Network error
    NetworkError(String),
    /// Parsing error
    ParseError(String),
    /// Provider has no credentials
    NotConfigured(String),
}

impl fmt::Display for LyricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LyricsError::NotFound => write!(f, "Lyrics not found"),
            LyricsError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LyricsError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LyricsError::NotConfigured(msg) => write!(f, "Not configured: {}", msg),
        }
    }
}

impl Error for LyricsError {}

impl From<HttpClientError> for LyricsError {
    fn from(error: HttpClientError) -> Self {
        match error {
            HttpClientError::RequestError(msg) => LyricsError::NetworkError(msg),
            HttpClientError::ParseError(msg) => LyricsError::ParseError(msg),
            HttpClientError::EmptyResponse => LyricsError::NotFound,
        }
    }
}

/// Lookup parameters for finding lyrics by metadata
#[derive(Debug, Clone)]
pub struct LyricsLookup {
    pub artist: String,
    pub title: String,
}

impl LyricsLookup {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }
}

/// Trait for providing lyrics from various sources
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    /// Get lyrics by artist and song title
    async fn get_lyrics_by_metadata(&self, lookup: &LyricsLookup) -> LyricsResult<String>;

    /// Get lyrics from a lyrics page URL
    async fn get_lyrics_by_url(&self, _url: &str) -> LyricsResult<String> {
        Err(LyricsError::NotFound)
    }

    /// Get the name/identifier of this lyrics provider
    fn provider_name(&self) -> &'static str;

    /// Check if this provider supports URL-based lookups
    fn supports_url_lookup(&self) -> bool {
        false
    }
}

/// A composite lyrics provider that tries multiple providers in order
pub struct CompositeLyricsProvider {
    providers: Vec<Box<dyn LyricsProvider>>,
}

impl CompositeLyricsProvider {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Add a provider to the list
    pub fn add_provider(mut self, provider: Box<dyn LyricsProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Get all provider names
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.provider_name()).collect()
    }
}

#[async_trait]
impl LyricsProvider for CompositeLyricsProvider {
    async fn get_lyrics_by_metadata(&self, lookup: &LyricsLookup) -> LyricsResult<String> {
        for provider in &self.providers {
            match provider.get_lyrics_by_metadata(lookup).await {
                Ok(lyrics) => {
                    log::debug!("Found lyrics for '{}' by '{}' via {}", lookup.title, lookup.artist, provider.provider_name());
                    return Ok(lyrics);
                }
                Err(LyricsError::NotFound) => continue,
                Err(e) => {
                    log::warn!("Provider {} failed: {}", provider.provider_name(), e);
                    continue;
                }
            }
        }
        Err(LyricsError::NotFound)
    }

    async fn get_lyrics_by_url(&self, url: &str) -> LyricsResult<String> {
        for provider in &self.providers {
            if !provider.supports_url_lookup() {
                continue;
            }

            match provider.get_lyrics_by_url(url).await {
                Ok(lyrics) => return Ok(lyrics),
                Err(LyricsError::NotFound) => continue,
                Err(e) => {
                    log::warn!("Provider {} failed: {}", provider.provider_name(), e);
                    continue;
                }
            }
        }
        Err(LyricsError::NotFound)
    }

    fn provider_name(&self) -> &'static str {
        "composite"
    }

    fn supports_url_lookup(&self) -> bool {
        self.providers.iter().any(|p| p.supports_url_lookup())
    }
}

impl Default for CompositeLyricsProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Lines that lyrics sites add around the actual lyrics
const UNWANTED_LINES: &[&str] = &[
    "You might also like",
    "Embed",
    "About Genius",
    "Press",
    "Advertise",
    "Event Space",
    "Privacy Policy",
    "Terms of Service",
    "Community Guidelines",
    "Copyright Policy",
    "Language: English",
    "Don't have an account?",
    "Sign Up",
    "Sign In",
];

lazy_static! {
    static ref SECTION_HEADER: Regex = Regex::new(r"^\[[^\]]*\]$").unwrap();
    static ref CONTRIBUTORS_LINE: Regex = Regex::new(r"^\d+\s*Contributors?").unwrap();
    static ref EMBED_SUFFIX: Regex = Regex::new(r"\d*\s*Embed\s*$").unwrap();
    static ref LYRICS_SELECTORS: Vec<Regex> = vec![
        // [data-lyrics-container]
        Regex::new(r#"(?i)<([a-z][a-z0-9]*)\b[^>]*\sdata-lyrics-container\b[^>]*>"#).unwrap(),
        // .lyrics
        Regex::new(r#"(?i)<([a-z][a-z0-9]*)\b[^>]*\sclass\s*=\s*["'](?:[^"']*\s)?lyrics(?:\s[^"']*)?["'][^>]*>"#).unwrap(),
        // .song_body-lyrics
        Regex::new(r#"(?i)<([a-z][a-z0-9]*)\b[^>]*\sclass\s*=\s*["'](?:[^"']*\s)?song_body-lyrics(?:\s[^"']*)?["'][^>]*>"#).unwrap(),
        // [class*="lyrics"]
        Regex::new(r#"<([a-zA-Z][a-zA-Z0-9]*)\b[^>]*\sclass\s*=\s*["'][^"']*lyrics[^"']*["'][^>]*>"#).unwrap(),
        // [class*="Lyrics"]
        Regex::new(r#"<([a-zA-Z][a-zA-Z0-9]*)\b[^>]*\sclass\s*=\s*["'][^"']*Lyrics[^"']*["'][^>]*>"#).unwrap(),
    ];
    static ref BR_TAG: Regex = Regex::new(r"(?i)<br\s*/?>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref ENTITY: Regex = Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap();
}

/// Check if a text is long enough to count as lyrics
pub fn is_substantial(text: &str, min_length: usize) -> bool {
    text.trim().chars().count() > min_length
}

/// Remove site boilerplate, section headers and repeated blank lines
pub fn clean_lyrics(text: &str) -> String {
    let text = EMBED_SUFFIX.replace(text.trim_end(), "");

    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if UNWANTED_LINES.contains(&line) || SECTION_HEADER.is_match(line) || CONTRIBUTORS_LINE.is_match(line) {
            continue;
        }
        if line.is_empty() && lines.last().map_or(true, |last| last.is_empty()) {
            continue;
        }
        lines.push(line);
    }

    lines.join("\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Convert an HTML fragment to plain text, keeping line breaks
pub fn html_to_text(html: &str) -> String {
    let with_breaks = BR_TAG.replace_all(html, "\n");
    let stripped = ANY_TAG.replace_all(&with_breaks, "");
    decode_entities(&stripped)
}

/// Inner HTML of the element whose opening tag ends at `content_start`
fn element_inner<'a>(html: &'a str, tag: &str, content_start: usize) -> &'a str {
    let rest = &html[content_start..];
    let tag_re = match Regex::new(&format!(r"(?i)<(/?){}\b[^>]*>", regex::escape(tag))) {
        Ok(re) => re,
        Err(_) => return rest,
    };

    let mut depth = 1usize;
    for caps in tag_re.captures_iter(rest) {
        let Some(whole) = caps.get(0) else { continue };
        if &caps[1] == "/" {
            depth -= 1;
            if depth == 0 {
                return &rest[..whole.start()];
            }
        } else if !whole.as_str().ends_with("/>") {
            depth += 1;
        }
    }
    rest
}

/// Extract lyrics from a lyrics page.
///
/// Selectors are tried in order; the text of all elements matching a selector
/// is joined and returned if it is longer than `min_length` characters.
pub fn extract_lyrics_from_html(html: &str, min_length: usize) -> Option<String> {
    for selector in LYRICS_SELECTORS.iter() {
        let mut parts: Vec<String> = Vec::new();
        let mut covered_until = 0;

        for caps in selector.captures_iter(html) {
            let Some(open_tag) = caps.get(0) else { continue };
            // Elements nested in an already collected element
            if open_tag.start() < covered_until {
                continue;
            }
            let inner = element_inner(html, &caps[1], open_tag.end());
            covered_until = open_tag.end() + inner.len();
            parts.push(html_to_text(inner));
        }

        if parts.is_empty() {
            continue;
        }

        let text = clean_lyrics(&parts.join("\n"));
        if is_substantial(&text, min_length) {
            return Some(text);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockLyricsProvider {
        name: &'static str,
        should_fail: bool,
    }

    impl MockLyricsProvider {
        fn new(name: &'static str, should_fail: bool) -> Self {
            Self { name, should_fail }
        }
    }

    #[async_trait]
    impl LyricsProvider for MockLyricsProvider {
        async fn get_lyrics_by_metadata(&self, lookup: &LyricsLookup) -> LyricsResult<String> {
            if self.should_fail {
                Err(LyricsError::NotFound)
            } else {
                Ok(format!("Lyrics for {} - {} from {}", lookup.artist, lookup.title, self.name))
            }
        }

        async fn get_lyrics_by_url(&self, url: &str) -> LyricsResult<String> {
            if self.should_fail {
                Err(LyricsError::NetworkError("offline".to_string()))
            } else {
                Ok(format!("Lyrics from URL {} via {}", url, self.name))
            }
        }

        fn provider_name(&self) -> &'static str {
            self.name
        }

        fn supports_url_lookup(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_composite_provider_success() {
        let composite = CompositeLyricsProvider::new()
            .add_provider(Box::new(MockLyricsProvider::new("provider1", true)))
            .add_provider(Box::new(MockLyricsProvider::new("provider2", false)));

        assert_eq!(composite.provider_names(), vec!["provider1", "provider2"]);

        let lookup = LyricsLookup::new("Artist", "Title");
        let lyrics = composite.get_lyrics_by_metadata(&lookup).await.unwrap();
        assert!(lyrics.contains("provider2"));

        let lyrics = composite.get_lyrics_by_url("https://genius.com/x").await.unwrap();
        assert!(lyrics.contains("provider2"));
    }

    #[tokio::test]
    async fn test_composite_provider_all_fail() {
        let composite = CompositeLyricsProvider::new()
            .add_provider(Box::new(MockLyricsProvider::new("provider1", true)))
            .add_provider(Box::new(MockLyricsProvider::new("provider2", true)));

        let lookup = LyricsLookup::new("Artist", "Title");
        let result = composite.get_lyrics_by_metadata(&lookup).await;
        assert!(matches!(result, Err(LyricsError::NotFound)));

        let result = composite.get_lyrics_by_url("https://genius.com/x").await;
        assert!(matches!(result, Err(LyricsError::NotFound)));
    }

    #[test]
    fn test_is_substantial() {
        assert!(!is_substantial("short", DEFAULT_MIN_LYRICS_LENGTH));
        assert!(!is_substantial(&"a".repeat(50), 50));
        assert!(is_substantial(&"a".repeat(51), 50));
        assert!(is_substantial(&"夜".repeat(51), 50));
    }

    #[test]
    fn test_clean_lyrics() {
        let raw = "3 ContributorsIdol Lyrics\n[Verse 1]\nline a\n\n\n\nline b\nYou might also like\nline c\n12Embed";
        assert_eq!(clean_lyrics(raw), "line a\n\nline b\nline c");
    }

    #[test]
    fn test_html_to_text() {
        let html = "<a href=\"#\">Tom &amp; Jerry</a><br/>&#12354;&#x3044;<br>end";
        assert_eq!(html_to_text(html), "Tom & Jerry\nあい\nend");
    }

    #[test]
    fn test_extract_lyrics_from_containers() {
        let verse = "沈むように溶けてゆくように<br/>二人だけの空が広がる夜に<br/>";
        let html = format!(
            r#"<html><body>
            <div class="header">Menu</div>
            <div data-lyrics-container="true" class="Lyrics__Container"><span>[Verse 1]</span><br/>{verse}<div><i>nested</i></div></div>
            <div data-lyrics-container="true">{verse}</div>
            <div class="footer">About Genius</div>
            </body></html>"#
        );

        let lyrics = extract_lyrics_from_html(&html, 10).unwrap();
        assert!(lyrics.starts_with("沈むように溶けてゆくように"));
        assert!(lyrics.contains("nested"));
        assert!(!lyrics.contains("[Verse 1]"));
        assert!(!lyrics.contains("Menu"));
        assert_eq!(lyrics.matches("二人だけの空が広がる夜に").count(), 2);
    }

    #[test]
    fn test_extract_lyrics_falls_back_to_class_selector() {
        let html = r#"<div class="song_body-lyrics"><p>Some lyric line that is long enough to pass the minimum length check.</p></div>"#;
        let lyrics = extract_lyrics_from_html(html, DEFAULT_MIN_LYRICS_LENGTH).unwrap();
        assert_eq!(lyrics, "Some lyric line that is long enough to pass the minimum length check.");
    }

    #[test]
    fn test_extract_lyrics_rejects_short_text() {
        let html = r#"<div data-lyrics-container="true">too short</div>"#;
        assert_eq!(extract_lyrics_from_html(html, DEFAULT_MIN_LYRICS_LENGTH), None);
        assert_eq!(extract_lyrics_from_html("<html></html>", DEFAULT_MIN_LYRICS_LENGTH), None);
    }
}
