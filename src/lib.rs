/// Song and video data structures
pub mod data;

/// REST API served by Rocket
pub mod api;

/// Configuration file and environment handling
pub mod config;

pub mod constants;

/// Logger setup with per-subsystem levels
pub mod logging;

/// Adapters for Spotify, Genius, lyrics.ovh and YouTube
pub mod providers;

/// Local scoring search and the multi-provider aggregator
pub mod search;

/// Caching, persistence, HTTP and text utilities
pub mod helpers;

// Re-export the most used types
pub use data::{Lyrics, SongRecord, Source, VideoResult};
pub use search::SearchAggregator;
