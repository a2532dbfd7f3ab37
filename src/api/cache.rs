use log::debug;
use rocket::serde::json::Json;
use rocket::{get, routes, Route, State};

use crate::api::{ApiResponse, AppState};
use crate::helpers::songcache::CacheStats;

/// Get statistics of the external result cache
#[get("/cache/stats")]
pub fn get_cache_statistics(state: &State<AppState>) -> Json<ApiResponse<CacheStats>> {
    debug!("API request: get cache statistics");
    ApiResponse::ok(state.cache.stats())
}

pub fn routes() -> Vec<Route> {
    routes![get_cache_statistics]
}
