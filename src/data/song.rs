//! Song records as returned by the providers, the result cache and the local library

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Genre assigned to provider results, which carry no genre information
pub const DEFAULT_GENRE: &str = "J-POP";

/// Language assigned when nothing else is known
pub const DEFAULT_LANGUAGE: &str = "ja";

/// Where a song record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Spotify,
    Genius,
    #[default]
    External,
    /// Songs stored in the local library
    Local,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Spotify => "spotify",
            Source::Genius => "genius",
            Source::External => "external",
            Source::Local => "local",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress of the lazy lyrics lookup for a cached record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LyricsState {
    #[default]
    Absent,
    Fetching,
    Present,
}

/// Lyrics in the three supported display formats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lyrics {
    pub original: String,
    pub hiragana: String,
    pub romaji: String,
}

impl Lyrics {
    /// Get the text for a format name, if the name is known
    pub fn format(&self, format: &str) -> Option<&str> {
        match format {
            "original" => Some(&self.original),
            "hiragana" => Some(&self.hiragana),
            "romaji" => Some(&self.romaji),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongMetadata {
    /// Duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_genre() -> String {
    DEFAULT_GENRE.to_string()
}

impl Default for SongMetadata {
    fn default() -> Self {
        SongMetadata {
            duration: None,
            bpm: None,
            key: None,
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    /// Identifier of a song stored in the local library
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub title: String,

    pub artist: String,

    #[serde(default)]
    pub album: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default = "default_genre")]
    pub genre: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    #[serde(default)]
    pub source: Source,

    #[serde(default)]
    pub popularity: u64,

    #[serde(default)]
    pub lyrics: Option<Lyrics>,

    #[serde(default)]
    pub lyrics_state: LyricsState,

    #[serde(default)]
    pub metadata: SongMetadata,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,

    /// Provider page for the song (e.g. the Genius song page)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SongRecord {
    /// Create a record with the defaults used for provider results
    pub fn new(title: impl Into<String>, artist: impl Into<String>, source: Source) -> Self {
        SongRecord {
            id: None,
            title: title.into(),
            artist: artist.into(),
            album: String::new(),
            year: None,
            genre: default_genre(),
            external_id: None,
            source,
            popularity: 0,
            lyrics: None,
            lyrics_state: LyricsState::Absent,
            metadata: SongMetadata::default(),
            tags: tags_for_genre(DEFAULT_GENRE),
            image_url: None,
            preview_url: None,
            url: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Cache key of this record, if it carries an external id
    pub fn cache_key(&self) -> Option<String> {
        self.external_id
            .as_deref()
            .map(|external_id| canonical_key(self.source, external_id))
    }

    /// Case-insensitive (title, artist) pair used to detect duplicates across providers
    pub fn dedupe_key(&self) -> (String, String) {
        (self.title.to_lowercase(), self.artist.to_lowercase())
    }

    pub fn has_lyrics(&self) -> bool {
        self.lyrics.is_some()
    }

    /// Attach lyrics and mark them as present
    pub fn set_lyrics(&mut self, lyrics: Lyrics) {
        self.lyrics = Some(lyrics);
        self.lyrics_state = LyricsState::Present;
    }

    /// Make `lyrics_state` agree with `lyrics`.
    /// Records written before the state field existed, or saved while a fetch
    /// was running, are repaired here.
    pub fn normalize_lyrics_state(&mut self) {
        self.lyrics_state = if self.lyrics.is_some() {
            LyricsState::Present
        } else {
            LyricsState::Absent
        };
    }

    /// Lower-cased words used for suggestions
    pub fn search_keywords(&self) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        for text in [&self.title, &self.artist, &self.album] {
            for word in text.split_whitespace() {
                let word = word.to_lowercase();
                if !keywords.contains(&word) {
                    keywords.push(word);
                }
            }
        }
        for tag in &self.tags {
            let tag = tag.to_lowercase();
            if !keywords.contains(&tag) {
                keywords.push(tag);
            }
        }
        keywords
    }
}

impl fmt::Display for SongRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.title, self.artist)?;
        if let Some(external_id) = &self.external_id {
            write!(f, " ({}:{})", self.source, external_id)?;
        }
        Ok(())
    }
}

/// Build the single cache key of a provider result
pub fn canonical_key(source: Source, external_id: &str) -> String {
    format!("{}:{}", source.as_str(), external_id)
}

/// Tags derived from a genre name
pub fn tags_for_genre(genre: &str) -> Vec<String> {
    let tags: &[&str] = match genre {
        "J-POP" => &["人気", "青春", "恋愛"],
        "Rock" => &["ロック", "バンド", "情熱"],
        "Ballad" => &["バラード", "切ない", "感動"],
        "Electronic" => &["エレクトロ", "ダンス", "モダン"],
        "Hip-Hop" => &["ヒップホップ", "ラップ", "ストリート"],
        _ => &["人気", "音楽", "エンターテイメント"],
    };
    tags.iter().map(|t| t.to_string()).collect()
}

/// Parse the year out of a provider release date ("2023", "2023-05", "2023-05-12")
pub fn parse_release_year(release_date: &str) -> Option<i32> {
    let digits: String = release_date.trim().chars().take(4).collect();
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_key() {
        let mut song = SongRecord::new("夜に駆ける", "YOASOBI", Source::Spotify);
        assert_eq!(song.cache_key(), None);

        song.external_id = Some("3dPtXHP0oXQ4HCWHsOA9js".to_string());
        assert_eq!(song.cache_key().as_deref(), Some("spotify:3dPtXHP0oXQ4HCWHsOA9js"));
    }

    #[test]
    fn test_dedupe_key_ignores_case() {
        let a = SongRecord::new("Idol", "YOASOBI", Source::Spotify);
        let b = SongRecord::new("IDOL", "yoasobi", Source::Genius);
        assert_eq!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn test_tags_for_genre() {
        assert_eq!(tags_for_genre("Rock"), vec!["ロック", "バンド", "情熱"]);
        assert_eq!(tags_for_genre("Polka"), vec!["人気", "音楽", "エンターテイメント"]);
    }

    #[test]
    fn test_parse_release_year() {
        assert_eq!(parse_release_year("2020-12-15"), Some(2020));
        assert_eq!(parse_release_year("1999"), Some(1999));
        assert_eq!(parse_release_year(""), None);
        assert_eq!(parse_release_year("unknown"), None);
    }

    #[test]
    fn test_serialization_uses_camel_case() {
        let mut song = SongRecord::new("Lemon", "米津玄師", Source::Spotify);
        song.external_id = Some("abc".to_string());
        song.image_url = Some("https://example.com/lemon.jpg".to_string());

        let json = serde_json::to_value(&song).unwrap();
        assert_eq!(json["externalId"], "abc");
        assert_eq!(json["imageUrl"], "https://example.com/lemon.jpg");
        assert_eq!(json["lyricsState"], "absent");
        assert_eq!(json["source"], "spotify");
        assert!(json["lyrics"].is_null());
        assert!(json.get("_id").is_none());
    }

    #[test]
    fn test_legacy_record_without_state() {
        let json = r#"{
            "title": "Lemon",
            "artist": "米津玄師",
            "externalId": "abc",
            "source": "spotify",
            "popularity": 80,
            "lyrics": {"original": "夢ならばどれほどよかったでしょう", "hiragana": "", "romaji": ""}
        }"#;
        let mut song: SongRecord = serde_json::from_str(json).unwrap();
        assert_eq!(song.genre, DEFAULT_GENRE);
        assert_eq!(song.metadata.language, "ja");
        assert_eq!(song.lyrics_state, LyricsState::Absent);

        song.normalize_lyrics_state();
        assert_eq!(song.lyrics_state, LyricsState::Present);
    }
}
