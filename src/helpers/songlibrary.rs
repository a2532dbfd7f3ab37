//! Local song collection stored in SQLite.
//!
//! Each row keeps the full record as JSON in `data`; the other columns exist
//! for filtering and sorting.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use log::{debug, info};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{tags_for_genre, SongMetadata, SongRecord, Source, DEFAULT_GENRE, DEFAULT_LANGUAGE};
use crate::helpers::transliteration::Transliterator;

/// Genres offered when the library is empty
pub const DEFAULT_GENRES: &[&str] = &["J-POP", "Rock", "Ballad", "Electronic", "Hip-Hop", "Anime", "City Pop"];

pub const SUPPORTED_LANGUAGES: &[&str] = &["ja", "en", "ko", "zh"];

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {}", .0.join("; "))]
    Validation(Vec<String>),
}

pub type LibraryResult<T> = Result<T, LibraryError>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LyricsInput {
    pub original: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataInput {
    pub duration: Option<f64>,
    pub bpm: Option<f64>,
    pub key: Option<String>,
    pub language: Option<String>,
}

/// Request body for creating or replacing a library song
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongInput {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub lyrics: Option<LyricsInput>,
    pub metadata: Option<MetadataInput>,
    pub tags: Option<Vec<String>>,
}

fn check_length(errors: &mut Vec<String>, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.push(format!("\"{}\" length must be less than or equal to {} characters long", field, max));
    }
}

impl SongInput {
    /// Check the input, returning every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (field, value) in [("title", &self.title), ("artist", &self.artist)] {
            match value.as_deref().map(str::trim) {
                None => errors.push(format!("\"{}\" is required", field)),
                Some("") => errors.push(format!("\"{}\" is not allowed to be empty", field)),
                Some(value) => check_length(&mut errors, field, value, 200),
            }
        }
        if let Some(album) = &self.album {
            check_length(&mut errors, "album", album.trim(), 200);
        }
        if let Some(year) = self.year {
            let max_year = i64::from(Utc::now().year() + 1);
            if !(1900..=max_year).contains(&year) {
                errors.push(format!("\"year\" must be between 1900 and {}", max_year));
            }
        }
        if let Some(genre) = &self.genre {
            check_length(&mut errors, "genre", genre.trim(), 100);
        }

        match self.lyrics.as_ref().map(|l| l.original.as_deref()) {
            None => errors.push("\"lyrics\" is required".to_string()),
            Some(None) => errors.push("\"lyrics.original\" is required".to_string()),
            Some(Some("")) => errors.push("\"lyrics.original\" is not allowed to be empty".to_string()),
            Some(Some(_)) => {}
        }

        if let Some(metadata) = &self.metadata {
            if metadata.duration.is_some_and(|d| d < 0.0) {
                errors.push("\"metadata.duration\" must be greater than or equal to 0".to_string());
            }
            if metadata.bpm.is_some_and(|b| b < 0.0) {
                errors.push("\"metadata.bpm\" must be greater than or equal to 0".to_string());
            }
            if let Some(key) = &metadata.key {
                check_length(&mut errors, "metadata.key", key, 10);
            }
            if let Some(language) = &metadata.language {
                if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
                    errors.push(format!("\"metadata.language\" must be one of [{}]", SUPPORTED_LANGUAGES.join(", ")));
                }
            }
        }

        for tag in self.tags.iter().flatten() {
            check_length(&mut errors, "tags", tag.trim(), 50);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn original_lyrics(&self) -> &str {
        self.lyrics.as_ref().and_then(|l| l.original.as_deref()).unwrap_or("")
    }

    /// Copy the input fields onto a record, keeping its identity and lyrics
    fn apply_to(&self, record: &mut SongRecord) {
        record.title = self.title.as_deref().unwrap_or("").trim().to_string();
        record.artist = self.artist.as_deref().unwrap_or("").trim().to_string();
        record.album = self.album.as_deref().unwrap_or("").trim().to_string();
        record.year = self.year.map(|y| y as i32);
        record.genre = match self.genre.as_deref().map(str::trim) {
            Some(genre) if !genre.is_empty() => genre.to_string(),
            _ => DEFAULT_GENRE.to_string(),
        };

        let metadata = self.metadata.clone().unwrap_or_default();
        record.metadata = SongMetadata {
            duration: metadata.duration.map(|d| d as u32),
            bpm: metadata.bpm.map(|b| b as u32),
            key: metadata.key,
            language: metadata.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        };

        record.tags = match &self.tags {
            Some(tags) => tags.iter().map(|t| t.trim().to_string()).collect(),
            None => tags_for_genre(&record.genre),
        };
    }
}

/// Filters and ordering for listing library songs
#[derive(Debug, Clone, Serialize)]
pub struct ListQuery {
    pub page: usize,
    pub limit: usize,
    pub sort_by: String,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub language: String,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            page: 1,
            limit: 20,
            sort_by: "popularity".to_string(),
            genre: None,
            year: None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

fn order_clause(sort_by: &str) -> &'static str {
    match sort_by {
        "newest" => "created_at DESC",
        "oldest" => "created_at ASC",
        "title" => "title ASC",
        "artist" => "artist ASC, title ASC",
        _ => "popularity DESC, created_at DESC",
    }
}

/// Fixed width timestamps so that text comparison orders them
fn sql_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn new_song_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SQLite backed song library
pub struct SongLibrary {
    conn: Mutex<Connection>,
}

impl SongLibrary {
    /// Open or create the library database at `path`, `:memory:` opens a private in-memory database
    pub fn open<P: AsRef<Path>>(path: P) -> LibraryResult<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Self::setup_database(&conn)?;
        info!("Opened song library at {:?}", path);
        Ok(SongLibrary { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> LibraryResult<Self> {
        Self::open(":memory:")
    }

    fn setup_database(conn: &Connection) -> LibraryResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS songs (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                artist TEXT NOT NULL,
                genre TEXT NOT NULL,
                year INTEGER,
                language TEXT NOT NULL,
                popularity INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_songs_popularity ON songs (popularity DESC)", [])?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_row(conn: &Connection, record: &SongRecord) -> LibraryResult<()> {
        let data = serde_json::to_string(record)?;
        let created_at = sql_timestamp(record.created_at.unwrap_or_else(Utc::now));
        let updated_at = sql_timestamp(record.updated_at.unwrap_or_else(Utc::now));
        conn.execute(
            "INSERT OR REPLACE INTO songs
                (id, title, artist, genre, year, language, popularity, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.title,
                record.artist,
                record.genre,
                record.year,
                record.metadata.language,
                record.popularity as i64,
                data,
                created_at,
                updated_at
            ],
        )?;
        Ok(())
    }

    fn read_records(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> LibraryResult<Vec<SongRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for data in rows {
            records.push(serde_json::from_str(&data?)?);
        }
        Ok(records)
    }

    /// Every song in the library
    pub fn all(&self) -> LibraryResult<Vec<SongRecord>> {
        Self::read_records(&self.lock(), "SELECT data FROM songs ORDER BY popularity DESC, created_at DESC", [])
    }

    /// One page of songs plus the number of songs matching the filters
    pub fn list(&self, query: &ListQuery) -> LibraryResult<(Vec<SongRecord>, usize)> {
        let limit = query.limit.max(1);
        let offset = i64::try_from(query.page.saturating_sub(1).saturating_mul(limit)).unwrap_or(i64::MAX);
        let filter = "WHERE language = ?1
                        AND (?2 IS NULL OR genre LIKE '%' || ?2 || '%')
                        AND (?3 IS NULL OR year = ?3)";

        let conn = self.lock();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM songs {}", filter),
            params![query.language, query.genre, query.year],
            |row| row.get(0),
        )?;
        let sql = format!(
            "SELECT data FROM songs {} ORDER BY {} LIMIT ?4 OFFSET ?5",
            filter,
            order_clause(&query.sort_by)
        );
        let songs = Self::read_records(
            &conn,
            &sql,
            params![query.language, query.genre, query.year, limit as i64, offset],
        )?;
        Ok((songs, total as usize))
    }

    pub fn get(&self, id: &str) -> LibraryResult<Option<SongRecord>> {
        let data: Option<String> = self
            .lock()
            .query_row("SELECT data FROM songs WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(match data {
            Some(data) => Some(serde_json::from_str(&data)?),
            None => None,
        })
    }

    /// Validate and store a new song, generating readings for its lyrics
    pub fn insert(&self, input: &SongInput, transliterator: &dyn Transliterator) -> LibraryResult<SongRecord> {
        input.validate().map_err(LibraryError::Validation)?;

        let mut record = SongRecord::new("", "", Source::Local);
        input.apply_to(&mut record);
        record.id = Some(new_song_id());
        record.set_lyrics(transliterator.process_lyrics(input.original_lyrics()));
        let now = Utc::now();
        record.created_at = Some(now);
        record.updated_at = Some(now);

        Self::write_row(&self.lock(), &record)?;
        debug!("Inserted library song {}", record);
        Ok(record)
    }

    /// Replace a song, regenerating readings only when the lyrics text changed
    pub fn update(
        &self,
        id: &str,
        input: &SongInput,
        transliterator: &dyn Transliterator,
    ) -> LibraryResult<Option<SongRecord>> {
        input.validate().map_err(LibraryError::Validation)?;

        let Some(mut record) = self.get(id)? else {
            return Ok(None);
        };
        input.apply_to(&mut record);

        let original = input.original_lyrics();
        let lyrics_changed = record.lyrics.as_ref().map_or(true, |l| l.original != original);
        if lyrics_changed {
            record.set_lyrics(transliterator.process_lyrics(original));
        }
        record.updated_at = Some(Utc::now());

        Self::write_row(&self.lock(), &record)?;
        debug!("Updated library song {} (lyrics changed: {})", record, lyrics_changed);
        Ok(Some(record))
    }

    /// Store a record as is, keeping its id when it has one
    pub fn save(&self, mut record: SongRecord) -> LibraryResult<SongRecord> {
        if record.id.is_none() {
            record.id = Some(new_song_id());
        }
        if record.created_at.is_none() {
            record.created_at = Some(Utc::now());
        }
        record.updated_at = Some(Utc::now());
        Self::write_row(&self.lock(), &record)?;
        Ok(record)
    }

    pub fn delete(&self, id: &str) -> LibraryResult<bool> {
        let deleted = self.lock().execute("DELETE FROM songs WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Distinct genres, sorted; the default genre list when the library has none
    pub fn genres(&self) -> LibraryResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT genre FROM songs WHERE genre != '' ORDER BY genre")?;
        let genres = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        if genres.is_empty() {
            return Ok(DEFAULT_GENRES.iter().map(|g| g.to_string()).collect());
        }
        Ok(genres)
    }

    /// Distinct release years, newest first; the last ten years when the library has none
    pub fn years(&self) -> LibraryResult<Vec<i32>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT year FROM songs WHERE year IS NOT NULL ORDER BY year DESC")?;
        let years = stmt
            .query_map([], |row| row.get::<_, i32>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        if years.is_empty() {
            let current = Utc::now().year();
            return Ok((0..10).map(|offset| current - offset).collect());
        }
        Ok(years)
    }

    /// Most popular songs, optionally only those added since `since`
    pub fn popular(&self, limit: usize, since: Option<DateTime<Utc>>) -> LibraryResult<Vec<SongRecord>> {
        Self::read_records(
            &self.lock(),
            "SELECT data FROM songs
             WHERE (?1 IS NULL OR created_at >= ?1)
             ORDER BY popularity DESC, created_at DESC LIMIT ?2",
            params![since.map(sql_timestamp), limit as i64],
        )
    }

    pub fn random(&self, limit: usize) -> LibraryResult<Vec<SongRecord>> {
        Self::read_records(
            &self.lock(),
            "SELECT data FROM songs ORDER BY RANDOM() LIMIT ?1",
            params![limit as i64],
        )
    }

    pub fn count(&self) -> LibraryResult<usize> {
        let count: i64 = self.lock().query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
