use log::{debug, info};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, routes, FromForm, Route, State};
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, ApiResponse, ApiResult, AppState};
use crate::data::{SongRecord, VideoResult};
use crate::helpers::songlibrary::{LibraryError, ListQuery, SongInput};
use crate::search::{search_songs, LookupError, Pagination, SearchOptions};

const MAX_LIST_LIMIT: usize = 100;

/// Videos returned for a song unless `limit` says otherwise
const DEFAULT_VIDEO_LIMIT: usize = 3;

pub const LYRICS_FORMATS: &[&str] = &["original", "hiragana", "romaji"];

#[derive(Debug, Default, FromForm)]
pub struct ListParams {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    #[field(name = "sortBy")]
    pub sort_by: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub language: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SongList {
    pub songs: Vec<SongRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongLyrics {
    pub song_id: String,
    pub title: String,
    pub artist: String,
    pub format: String,
    pub lyrics: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoRequest {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DeletedSong {
    pub id: String,
}

fn library_error(action: &str, error: LibraryError) -> ApiError {
    match error {
        LibraryError::Validation(details) => ApiError::validation(details),
        other => ApiError::internal(action, other),
    }
}

pub fn check_format(format: &str) -> Result<(), ApiError> {
    if LYRICS_FORMATS.contains(&format) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid format. Must be one of: original, hiragana, romaji"))
    }
}

/// Library songs, filtered and paginated
#[get("/songs?<params..>")]
pub fn list_songs(params: ListParams, state: &State<AppState>) -> ApiResult<SongList> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, MAX_LIST_LIMIT);
    let sort_by = params.sort_by.unwrap_or_else(|| "popularity".to_string());
    let language = params.language.unwrap_or_else(|| "ja".to_string());
    let genre = params.genre.filter(|g| !g.trim().is_empty());

    if let Some(search) = params.search.filter(|s| !s.trim().is_empty()) {
        let songs = state
            .library
            .all()
            .map_err(|e| ApiError::internal("Failed to fetch songs", e))?;
        let options = SearchOptions {
            sort_by,
            genre,
            year: params.year,
            language: Some(language),
            page,
            limit,
            ..Default::default()
        };
        let result = search_songs(songs, &search, &options);
        return Ok(ApiResponse::ok(SongList {
            songs: result.songs,
            pagination: result.pagination,
        }));
    }

    let query = ListQuery {
        page,
        limit,
        sort_by,
        genre,
        year: params.year,
        language,
    };
    let (songs, total) = state
        .library
        .list(&query)
        .map_err(|e| ApiError::internal("Failed to fetch songs", e))?;
    Ok(ApiResponse::ok(SongList {
        songs,
        pagination: Pagination::new(page, limit, total),
    }))
}

/// A library song, or a cached external song
#[get("/songs/<id>")]
pub fn get_song(id: &str, state: &State<AppState>) -> ApiResult<SongRecord> {
    match state.find_song(id)? {
        Some(song) => Ok(ApiResponse::ok(song)),
        None => Err(ApiError::not_found("Song not found")),
    }
}

/// An external song with its lyrics attached
#[get("/songs/external/<id>", rank = 1)]
pub async fn get_external_song(id: &str, state: &State<AppState>) -> ApiResult<SongRecord> {
    debug!("API request: external song {}", id);
    match state.aggregator.get_external_song(id).await {
        Ok(song) => Ok(ApiResponse::ok(song)),
        Err(LookupError::NotCached) => Err(ApiError::not_found("Song not found in cache. Please search for it first.")),
        Err(LookupError::NotFound) => Err(ApiError::not_found("Song not found")),
    }
}

#[get("/songs/<id>/lyrics?<format>", rank = 2)]
pub async fn get_song_lyrics(id: &str, format: Option<String>, state: &State<AppState>) -> ApiResult<SongLyrics> {
    let format = format.unwrap_or_else(|| "original".to_string());
    check_format(&format)?;

    let song = state
        .find_song_with_lyrics(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Song not found"))?;
    let lyrics = song
        .lyrics
        .as_ref()
        .and_then(|l| l.format(&format))
        .ok_or_else(|| ApiError::not_found("Lyrics not found"))?
        .to_string();

    Ok(ApiResponse::ok(SongLyrics {
        song_id: id.to_string(),
        title: song.title,
        artist: song.artist,
        format,
        lyrics,
    }))
}

async fn videos(id: &str, request: VideoRequest, state: &State<AppState>) -> ApiResult<Vec<VideoResult>> {
    let known = if request.title.is_none() || request.artist.is_none() {
        state.find_song(id)?
    } else {
        None
    };
    let title = request
        .title
        .or_else(|| known.as_ref().map(|s| s.title.clone()))
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Song title is required"))?;
    let artist = request
        .artist
        .or_else(|| known.as_ref().map(|s| s.artist.clone()))
        .unwrap_or_default();

    debug!("API request: videos for '{}' by '{}'", title, artist);
    let limit = request.limit.unwrap_or(DEFAULT_VIDEO_LIMIT).max(1);
    Ok(ApiResponse::ok(state.aggregator.videos_for_song(&title, &artist, limit).await))
}

#[get("/songs/<id>/youtube?<title>&<artist>&<limit>", rank = 2)]
pub async fn get_song_videos(
    id: &str,
    title: Option<String>,
    artist: Option<String>,
    limit: Option<usize>,
    state: &State<AppState>,
) -> ApiResult<Vec<VideoResult>> {
    videos(id, VideoRequest { title, artist, limit }, state).await
}

#[post("/songs/<id>/youtube", data = "<body>")]
pub async fn post_song_videos(
    id: &str,
    body: Option<Json<VideoRequest>>,
    state: &State<AppState>,
) -> ApiResult<Vec<VideoResult>> {
    let request = body.map(|b| b.into_inner()).unwrap_or_default();
    videos(id, request, state).await
}

#[post("/songs", data = "<input>")]
pub fn create_song(
    input: Json<SongInput>,
    state: &State<AppState>,
) -> Result<Custom<Json<ApiResponse<SongRecord>>>, ApiError> {
    let song = state
        .library
        .insert(&input, state.transliterator.as_ref())
        .map_err(|e| library_error("Failed to create song", e))?;
    info!("Created library song {}", song);
    Ok(Custom(
        Status::Created,
        ApiResponse::ok_with_message(song, "Song created successfully"),
    ))
}

#[put("/songs/<id>", data = "<input>")]
pub fn update_song(id: &str, input: Json<SongInput>, state: &State<AppState>) -> ApiResult<SongRecord> {
    match state
        .library
        .update(id, &input, state.transliterator.as_ref())
        .map_err(|e| library_error("Failed to update song", e))?
    {
        Some(song) => Ok(ApiResponse::ok_with_message(song, "Song updated successfully")),
        None => Err(ApiError::not_found("Song not found")),
    }
}

#[delete("/songs/<id>")]
pub fn delete_song(id: &str, state: &State<AppState>) -> ApiResult<DeletedSong> {
    let deleted = state
        .library
        .delete(id)
        .map_err(|e| ApiError::internal("Failed to delete song", e))?;
    if !deleted {
        return Err(ApiError::not_found("Song not found"));
    }
    info!("Deleted library song {}", id);
    Ok(ApiResponse::ok_with_message(DeletedSong { id: id.to_string() }, "Song deleted successfully"))
}

pub fn routes() -> Vec<Route> {
    routes![
        list_songs,
        get_song,
        get_external_song,
        get_song_lyrics,
        get_song_videos,
        post_song_videos,
        create_song,
        update_song,
        delete_song,
    ]
}
