pub use crate::constants::API_PREFIX;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::data::{SongRecord, Source};
use crate::helpers::songcache::SongCache;
use crate::helpers::songlibrary::SongLibrary;
use crate::helpers::transliteration::Transliterator;
use crate::search::SearchAggregator;

pub mod cache;
pub mod lyrics;
pub mod response;
pub mod search;
pub mod server;
pub mod songs;

pub use response::{ApiError, ApiResponse, ApiResult};

/// Shared state of all routes
pub struct AppState {
    pub aggregator: Arc<SearchAggregator>,
    pub library: Arc<SongLibrary>,
    pub cache: Arc<SongCache>,
    pub transliterator: Arc<dyn Transliterator>,
    pub config: AppConfig,
}

impl AppState {
    /// Library song by id, otherwise a cached external song for any accepted id form
    pub fn find_song(&self, id: &str) -> Result<Option<SongRecord>, ApiError> {
        if let Some(song) = self
            .library
            .get(id)
            .map_err(|e| ApiError::internal("Failed to fetch song", e))?
        {
            return Ok(Some(song));
        }
        Ok(self.aggregator.find_cached(id))
    }

    /// Like `find_song`, attaching lyrics to cached external songs first
    pub async fn find_song_with_lyrics(&self, id: &str) -> Result<Option<SongRecord>, ApiError> {
        match self.find_song(id)? {
            Some(song) if song.source == Source::Local || song.has_lyrics() => Ok(Some(song)),
            Some(song) => Ok(Some(self.aggregator.get_external_song(id).await.unwrap_or(song))),
            None => Ok(None),
        }
    }
}
