use log::debug;
use rocket::serde::json::Json;
use rocket::{get, post, routes, FromForm, Route, State};
use serde::{Deserialize, Serialize};

use crate::api::search::time_range_start;
use crate::api::songs::check_format;
use crate::api::{ApiError, ApiResponse, ApiResult, AppState};
use crate::data::{Lyrics, SongRecord, Source};
use crate::helpers::transliteration::Furigana;

const MAX_DISCOVERY_LIMIT: usize = 100;

#[derive(Debug, Default, FromForm)]
pub struct LyricsParams {
    pub format: Option<String>,
    #[field(name = "showFurigana")]
    pub show_furigana: Option<bool>,
    #[field(name = "showRomaji")]
    pub show_romaji: Option<bool>,
    /// Title and artist for a live lookup when the id is unknown
    pub title: Option<String>,
    pub artist: Option<String>,
}

#[derive(Debug, Default, FromForm)]
pub struct PopularParams {
    pub limit: Option<usize>,
    #[field(name = "timeRange")]
    pub time_range: Option<String>,
    pub genre: Option<String>,
}

/// Lyrics in the requested format, with optional extra readings
#[derive(Debug, Serialize)]
pub struct LyricsText {
    pub format: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hiragana: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub romaji: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongLyricsData {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: Option<i32>,
    pub genre: String,
    pub lyrics: LyricsText,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsFormats {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub formats: Lyrics,
}

#[derive(Debug, Deserialize)]
pub struct TextInput {
    pub text: Option<serde_json::Value>,
}

impl TextInput {
    fn text(&self) -> Result<&str, ApiError> {
        self.text
            .as_ref()
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::bad_request("Text is required and must be a string"))
    }
}

async fn song_with_lyrics(id: &str, state: &State<AppState>) -> Result<(SongRecord, Lyrics), ApiError> {
    let mut song = state
        .find_song_with_lyrics(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Song not found"))?;
    let lyrics = song
        .lyrics
        .take()
        .ok_or_else(|| ApiError::not_found("Lyrics not found"))?;
    Ok((song, lyrics))
}

#[get("/lyrics/<id>?<params..>")]
pub async fn get_lyrics(id: &str, params: LyricsParams, state: &State<AppState>) -> ApiResult<SongLyricsData> {
    let format = params.format.unwrap_or_else(|| "original".to_string());
    check_format(&format)?;
    debug!("API request: lyrics for {} in {}", id, format);

    let (song, lyrics) = match song_with_lyrics(id, state).await {
        Err(ApiError::NotFound(error)) => {
            let title = params.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
            let artist = params.artist.as_deref().map(str::trim).filter(|a| !a.is_empty());
            let (Some(title), Some(artist)) = (title, artist) else {
                return Err(ApiError::NotFound(error));
            };
            debug!("Fetching live lyrics for {} - {}", artist, title);
            let lyrics = state
                .aggregator
                .lyrics_for(title, artist)
                .await
                .ok_or_else(|| ApiError::not_found("Lyrics not found"))?;
            (SongRecord::new(title, artist, Source::External), lyrics)
        }
        found => found?,
    };
    let text = lyrics.format(&format).unwrap_or(&lyrics.original).to_string();
    let hiragana = (params.show_furigana.unwrap_or(false) && format != "hiragana").then(|| lyrics.hiragana.clone());
    let romaji = (params.show_romaji.unwrap_or(false) && format != "romaji").then(|| lyrics.romaji.clone());

    Ok(ApiResponse::ok(SongLyricsData {
        song_id: id.to_string(),
        title: song.title,
        artist: song.artist,
        album: song.album,
        year: song.year,
        genre: song.genre,
        lyrics: LyricsText {
            format,
            text,
            hiragana,
            romaji,
        },
    }))
}

#[get("/lyrics/<id>/formats")]
pub async fn get_lyrics_formats(id: &str, state: &State<AppState>) -> ApiResult<LyricsFormats> {
    let (song, lyrics) = song_with_lyrics(id, state).await?;
    Ok(ApiResponse::ok(LyricsFormats {
        song_id: id.to_string(),
        title: song.title,
        artist: song.artist,
        formats: lyrics,
    }))
}

/// Most popular library songs, optionally limited to a time range and genre
#[get("/lyrics/popular?<params..>")]
pub fn popular(params: PopularParams, state: &State<AppState>) -> ApiResult<Vec<SongRecord>> {
    let limit = params.limit.unwrap_or(10).clamp(1, MAX_DISCOVERY_LIMIT);
    let since = params.time_range.as_deref().and_then(time_range_start);
    let genre = params.genre.filter(|g| !g.trim().is_empty()).map(|g| g.to_lowercase());

    // Genre is filtered after the query
    let fetch = if genre.is_some() { limit * 5 } else { limit };
    let songs = state
        .library
        .popular(fetch, since)
        .map_err(|e| ApiError::internal("Failed to fetch popular lyrics", e))?;
    let songs = songs
        .into_iter()
        .filter(|s| genre.as_ref().map_or(true, |g| s.genre.to_lowercase().contains(g.as_str())))
        .take(limit)
        .collect();
    Ok(ApiResponse::ok(songs))
}

#[get("/lyrics/random?<limit>")]
pub fn random(limit: Option<usize>, state: &State<AppState>) -> ApiResult<Vec<SongRecord>> {
    let limit = limit.unwrap_or(5).clamp(1, MAX_DISCOVERY_LIMIT);
    state
        .library
        .random(limit)
        .map(ApiResponse::ok)
        .map_err(|e| ApiError::internal("Failed to fetch random lyrics", e))
}

/// Convert arbitrary text into all lyrics formats
#[post("/lyrics/process", data = "<input>")]
pub fn process(input: Json<TextInput>, state: &State<AppState>) -> ApiResult<Lyrics> {
    let text = input.text()?;
    Ok(ApiResponse::ok(state.transliterator.process_lyrics(text)))
}

#[post("/lyrics/furigana", data = "<input>")]
pub fn furigana(input: Json<TextInput>, state: &State<AppState>) -> ApiResult<Furigana> {
    let text = input.text()?;
    Ok(ApiResponse::ok(state.transliterator.add_furigana(text)))
}

pub fn routes() -> Vec<Route> {
    routes![get_lyrics, get_lyrics_formats, popular, random, process, furigana]
}
