//! Relevance scored search over library songs

use std::cmp::Ordering;

use serde::Serialize;

use crate::data::SongRecord;

const TITLE_EXACT: f64 = 1000.0;
const TITLE_CONTAINS: f64 = 500.0;
const TITLE_STARTS_WITH: f64 = 300.0;
const ARTIST_EXACT: f64 = 800.0;
const ARTIST_CONTAINS: f64 = 400.0;
const ARTIST_STARTS_WITH: f64 = 200.0;
const ALBUM_CONTAINS: f64 = 200.0;
const LYRICS_CONTAINS: f64 = 100.0;
const TAGS_CONTAINS: f64 = 150.0;

const WORD_TITLE: f64 = 50.0;
const WORD_ARTIST: f64 = 40.0;
const WORD_ALBUM: f64 = 30.0;
const WORD_LYRICS: f64 = 20.0;
const WORD_TAGS: f64 = 25.0;

/// Query words shorter than this are ignored
const MIN_WORD_CHARS: usize = 2;

/// Field restriction requested with the `type` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchType {
    #[default]
    All,
    Title,
    Artist,
    Lyrics,
}

impl SearchType {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("title") => SearchType::Title,
            Some("artist") => SearchType::Artist,
            Some("lyrics") => SearchType::Lyrics,
            _ => SearchType::All,
        }
    }

    fn scores(self, field: SearchType) -> bool {
        self == SearchType::All || self == field
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub search_type: SearchType,
    pub sort_by: String,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub language: Option<String>,
    pub page: usize,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            search_type: SearchType::All,
            sort_by: "relevance".to_string(),
            genre: None,
            year: None,
            language: None,
            page: 1,
            limit: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        let limit = limit.max(1);
        Pagination {
            page: page.max(1),
            limit,
            total,
            pages: total.div_ceil(limit),
        }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone)]
pub struct SearchPage {
    pub songs: Vec<SongRecord>,
    pub pagination: Pagination,
}

/// Relevance of a song for an already lower-cased, trimmed query
pub fn score_song(song: &SongRecord, query: &str, search_type: SearchType) -> f64 {
    let title = song.title.to_lowercase();
    let artist = song.artist.to_lowercase();
    let album = song.album.to_lowercase();
    let lyrics = song
        .lyrics
        .as_ref()
        .map(|l| l.original.to_lowercase())
        .unwrap_or_default();
    let tags = song.tags.join(" ").to_lowercase();

    let mut score = 0.0;

    if search_type.scores(SearchType::Title) {
        if title == query {
            score += TITLE_EXACT;
        } else if title.contains(query) {
            score += TITLE_CONTAINS;
        } else if title.starts_with(query) {
            score += TITLE_STARTS_WITH;
        }
    }
    if search_type.scores(SearchType::Artist) {
        if artist == query {
            score += ARTIST_EXACT;
        } else if artist.contains(query) {
            score += ARTIST_CONTAINS;
        } else if artist.starts_with(query) {
            score += ARTIST_STARTS_WITH;
        }
    }
    if search_type == SearchType::All {
        if album.contains(query) {
            score += ALBUM_CONTAINS;
        }
        if tags.contains(query) {
            score += TAGS_CONTAINS;
        }
    }
    if search_type.scores(SearchType::Lyrics) && lyrics.contains(query) {
        score += LYRICS_CONTAINS;
    }

    for word in query.split_whitespace().filter(|w| w.chars().count() >= MIN_WORD_CHARS) {
        if search_type.scores(SearchType::Title) && title.contains(word) {
            score += WORD_TITLE;
        }
        if search_type.scores(SearchType::Artist) && artist.contains(word) {
            score += WORD_ARTIST;
        }
        if search_type == SearchType::All {
            if album.contains(word) {
                score += WORD_ALBUM;
            }
            if tags.contains(word) {
                score += WORD_TAGS;
            }
        }
        if search_type.scores(SearchType::Lyrics) && lyrics.contains(word) {
            score += WORD_LYRICS;
        }
    }

    if score > 0.0 {
        score += (1.0 + song.popularity as f64).ln() * 10.0;
    }
    score
}

fn matches_filters(song: &SongRecord, options: &SearchOptions) -> bool {
    if let Some(genre) = &options.genre {
        if !song.genre.to_lowercase().contains(&genre.to_lowercase()) {
            return false;
        }
    }
    if options.year.is_some() && song.year != options.year {
        return false;
    }
    if let Some(language) = &options.language {
        if &song.metadata.language != language {
            return false;
        }
    }
    true
}

fn compare(sort_by: &str, a: &(f64, SongRecord), b: &(f64, SongRecord)) -> Ordering {
    let (score_a, song_a) = a;
    let (score_b, song_b) = b;
    match sort_by {
        "popularity" => song_b.popularity.cmp(&song_a.popularity),
        "year" => song_b.year.cmp(&song_a.year),
        "newest" => song_b.created_at.cmp(&song_a.created_at),
        "oldest" => song_a.created_at.cmp(&song_b.created_at),
        "title" => song_a.title.cmp(&song_b.title),
        "artist" => song_a.artist.cmp(&song_b.artist).then_with(|| song_a.title.cmp(&song_b.title)),
        _ => score_b.partial_cmp(score_a).unwrap_or(Ordering::Equal),
    }
}

/// Score, filter, sort and paginate `songs` for `query`
pub fn search_songs(songs: Vec<SongRecord>, query: &str, options: &SearchOptions) -> SearchPage {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return SearchPage {
            songs: Vec::new(),
            pagination: Pagination::new(options.page, options.limit, 0),
        };
    }

    let mut scored: Vec<(f64, SongRecord)> = songs
        .into_iter()
        .filter(|song| matches_filters(song, options))
        .map(|song| (score_song(&song, &query, options.search_type), song))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| compare(&options.sort_by, a, b));

    let pagination = Pagination::new(options.page, options.limit, scored.len());
    let songs = scored
        .into_iter()
        .skip(pagination.offset())
        .take(pagination.limit)
        .map(|(_, song)| song)
        .collect();
    SearchPage { songs, pagination }
}
