pub mod aggregator;
pub mod local;

pub use aggregator::{LookupError, RealtimeResults, SearchAggregator, Suggestion};
pub use local::{search_songs, Pagination, SearchOptions, SearchPage, SearchType};
