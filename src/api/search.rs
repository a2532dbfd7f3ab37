use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use rocket::serde::json::Json;
use rocket::{get, routes, FromForm, Route, State};
use serde::Serialize;

use crate::api::{ApiError, ApiResponse, ApiResult, AppState};
use crate::data::SongRecord;
use crate::helpers::transliteration::{contains_japanese, Readings};
use crate::search::{search_songs, Pagination, RealtimeResults, SearchOptions, SearchType, Suggestion};

const MAX_SEARCH_LIMIT: usize = 500;

/// External results added to a local search with `includeExternal=true`
const EXTERNAL_RESULTS_LIMIT: usize = 10;

#[derive(Debug, Default, FromForm)]
pub struct SearchParams {
    pub q: Option<String>,
    pub query: Option<String>,
    #[field(name = "type")]
    pub search_type: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
    #[field(name = "sortBy")]
    pub sort_by: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub language: Option<String>,
    #[field(name = "includeReadings")]
    pub include_readings: Option<bool>,
    #[field(name = "includeExternal")]
    pub include_external: Option<bool>,
}

#[derive(Debug, Default, FromForm)]
pub struct RealtimeParams {
    pub q: Option<String>,
    pub query: Option<String>,
    pub limit: Option<usize>,
    #[field(name = "includeExternal")]
    pub include_external: Option<bool>,
}

#[derive(Debug, Default, FromForm)]
pub struct TrendingParams {
    pub limit: Option<usize>,
    #[field(name = "timeRange")]
    pub time_range: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SongWithReadings {
    #[serde(flatten)]
    pub song: SongRecord,
    #[serde(rename = "titleReadings", skip_serializing_if = "Option::is_none")]
    pub title_readings: Option<Readings>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    pub songs: Vec<SongWithReadings>,
    pub pagination: Pagination,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_results: Option<Vec<SongRecord>>,
}

#[derive(Debug, Serialize)]
pub struct RealtimeData {
    #[serde(flatten)]
    pub results: RealtimeResults,
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingData {
    pub songs: Vec<SongRecord>,
    pub time_range: String,
    pub source: &'static str,
}

/// The trimmed query from `q` or `query`
fn required_query(q: Option<String>, query: Option<String>) -> Result<String, ApiError> {
    q.or(query)
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("Search query is required"))
}

/// Start of a `timeRange` window (day, week, month, year); `None` for all time
pub fn time_range_start(time_range: &str) -> Option<DateTime<Utc>> {
    let days = match time_range {
        "day" => 1,
        "week" => 7,
        "month" => 30,
        "year" => 365,
        _ => return None,
    };
    Some(Utc::now() - Duration::days(days))
}

/// Scored search over the local library
#[get("/search?<params..>")]
pub async fn search(params: SearchParams, state: &State<AppState>) -> ApiResult<SearchData> {
    let query = required_query(params.q, params.query)?;
    debug!("API request: search '{}'", query);

    let options = SearchOptions {
        search_type: SearchType::parse(params.search_type.as_deref()),
        sort_by: params.sort_by.unwrap_or_else(|| "relevance".to_string()),
        genre: params.genre.filter(|g| !g.trim().is_empty()),
        year: params.year,
        language: params.language.filter(|l| !l.trim().is_empty()),
        page: params.page.unwrap_or(1).max(1),
        limit: params.limit.unwrap_or(20).clamp(1, MAX_SEARCH_LIMIT),
    };

    let library_songs = state
        .library
        .all()
        .map_err(|e| ApiError::internal("Failed to perform search", e))?;
    let page = search_songs(library_songs, &query, &options);

    let with_readings = params.include_readings.unwrap_or(false) && contains_japanese(&query);
    let songs = page
        .songs
        .into_iter()
        .map(|song| SongWithReadings {
            title_readings: with_readings.then(|| state.transliterator.extract_readings(&song.title)),
            song,
        })
        .collect();

    let external_results = if params.include_external.unwrap_or(false) {
        Some(state.aggregator.search_multiple_sources(&query, EXTERNAL_RESULTS_LIMIT).await)
    } else {
        None
    };

    Ok(ApiResponse::ok(SearchData {
        songs,
        pagination: page.pagination,
        query,
        external_results,
    }))
}

/// Library and provider results in one response
#[get("/search/realtime?<params..>")]
pub async fn search_realtime(params: RealtimeParams, state: &State<AppState>) -> ApiResult<RealtimeData> {
    let query = required_query(params.q, params.query)?;
    let limit = params.limit.unwrap_or(20).clamp(1, MAX_SEARCH_LIMIT);
    let include_external = params.include_external.unwrap_or(true);
    debug!("API request: realtime search '{}' (limit {}, external {})", query, limit, include_external);

    let results = state.aggregator.search_realtime(&query, limit, include_external).await;
    Ok(ApiResponse::ok(RealtimeData {
        results,
        query,
        timestamp: Utc::now(),
    }))
}

#[get("/search/suggestions?<q>&<limit>")]
pub fn suggestions(q: Option<String>, limit: Option<usize>, state: &State<AppState>) -> Json<ApiResponse<Vec<Suggestion>>> {
    let query = q.unwrap_or_default();
    ApiResponse::ok(state.aggregator.suggestions(&query, limit.unwrap_or(10)))
}

/// Popular library songs, or provider trending tracks when the library is empty
#[get("/search/trending?<params..>")]
pub async fn trending(params: TrendingParams, state: &State<AppState>) -> ApiResult<TrendingData> {
    let limit = params.limit.unwrap_or(20).clamp(1, MAX_SEARCH_LIMIT);
    let time_range = params.time_range.unwrap_or_else(|| "week".to_string());

    let library_size = state
        .library
        .count()
        .map_err(|e| ApiError::internal("Failed to fetch trending songs", e))?;
    if library_size == 0 {
        let songs = state.aggregator.trending(limit).await;
        return Ok(ApiResponse::ok(TrendingData {
            songs,
            time_range,
            source: "providers",
        }));
    }

    let songs = state
        .library
        .popular(limit, time_range_start(&time_range))
        .map_err(|e| ApiError::internal("Failed to fetch trending songs", e))?;
    Ok(ApiResponse::ok(TrendingData {
        songs,
        time_range,
        source: "library",
    }))
}

#[get("/search/genres")]
pub fn genres(state: &State<AppState>) -> ApiResult<Vec<String>> {
    match state.library.genres() {
        Ok(genres) => Ok(ApiResponse::ok(genres)),
        Err(e) => {
            warn!("Failed to read genres: {}", e);
            Err(ApiError::internal("Failed to fetch genres", e))
        }
    }
}

#[get("/search/years")]
pub fn years(state: &State<AppState>) -> ApiResult<Vec<i32>> {
    state
        .library
        .years()
        .map(ApiResponse::ok)
        .map_err(|e| ApiError::internal("Failed to fetch years", e))
}

pub fn routes() -> Vec<Route> {
    routes![search, search_realtime, suggestions, trending, genres, years]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_query() {
        assert_eq!(required_query(Some(" idol ".to_string()), None).unwrap(), "idol");
        assert_eq!(required_query(None, Some("lemon".to_string())).unwrap(), "lemon");
        assert!(required_query(Some("   ".to_string()), None).is_err());
        assert!(required_query(None, None).is_err());
    }

    #[test]
    fn test_time_range_start() {
        assert!(time_range_start("all").is_none());
        let week = time_range_start("week").unwrap();
        let expected = Utc::now() - Duration::days(7);
        assert!((week - expected).num_seconds().abs() < 5);
    }
}
