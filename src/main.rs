use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use kashifind::api::server::start_rocket_server;
use kashifind::api::AppState;
use kashifind::config::{AppConfig, DEFAULT_CONFIG_FILE};
use kashifind::helpers::http_client::new_http_client;
use kashifind::helpers::lyrics::{CompositeLyricsProvider, LyricsProvider};
use kashifind::helpers::songcache::{SongCache, SongStore};
use kashifind::helpers::songlibrary::SongLibrary;
use kashifind::helpers::transliteration::{TableTransliterator, Transliterator};
use kashifind::logging::initialize_default_logging;
use kashifind::providers::{
    GeniusLyricsProvider, GeniusProvider, LyricsOvhProvider, SpotifyProvider, YouTubeProvider,
};
use kashifind::search::SearchAggregator;

#[derive(Parser, Debug)]
#[command(name = "kashifind")]
#[command(about = "Japanese lyrics search server")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Port to listen on, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// File used to persist the external result cache
    #[arg(long, value_name = "FILE")]
    cache_file: Option<PathBuf>,

    /// SQLite database of the local song library
    #[arg(long, value_name = "FILE")]
    library_db: Option<PathBuf>,
}

/// Configuration plus the warnings to log once logging is up
fn load_config(args: &Args) -> (AppConfig, Vec<String>) {
    let mut config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    let warnings = config.apply_env(|name| std::env::var(name).ok());

    if let Some(port) = args.port {
        config.webserver.port = port;
    }
    if let Some(cache_file) = &args.cache_file {
        config.cache.file = cache_file.clone();
    }
    if let Some(library_db) = &args.library_db {
        config.library.dbfile = library_db.clone();
    }
    (config, warnings)
}

fn build_state(config: AppConfig) -> Result<AppState, Box<dyn std::error::Error>> {
    let http = new_http_client(config.http.timeout_secs);
    let backoff = config.http.retry_backoff();

    let spotify = Arc::new(SpotifyProvider::new(config.spotify.clone(), http.clone(), backoff));
    let genius = Arc::new(GeniusProvider::new(config.genius.clone(), http.clone(), backoff));
    let youtube = Arc::new(YouTubeProvider::new(config.youtube.clone(), http.clone(), backoff));

    let mut lyrics = CompositeLyricsProvider::new();
    if config.lyrics.enable {
        lyrics = lyrics
            .add_provider(Box::new(
                LyricsOvhProvider::new(http.clone(), backoff).with_min_length(config.lyrics.min_length),
            ))
            .add_provider(Box::new(
                GeniusLyricsProvider::new(genius.clone()).with_min_length(config.lyrics.min_length),
            ));
    } else {
        warn!("Lyrics lookup is disabled");
    }
    info!("Lyrics providers: {:?}", lyrics.provider_names());
    let lyrics: Arc<dyn LyricsProvider> = Arc::new(lyrics);

    let transliterator: Arc<dyn Transliterator> = Arc::new(TableTransliterator::new());

    let cache = Arc::new(SongCache::with_snapshot(config.cache.capacity, config.cache.file.clone()));
    if let Err(e) = cache.load_snapshot() {
        warn!("Could not load cache snapshot {}: {}", config.cache.file.display(), e);
    }

    let library = Arc::new(SongLibrary::open(&config.library.dbfile)?);
    info!("Song library {} holds {} songs", config.library.dbfile.display(), library.count()?);

    let store: Arc<dyn SongStore> = cache.clone();
    let aggregator = SearchAggregator::new(store, lyrics, transliterator.clone())
        .with_provider(spotify)
        .with_provider(genius)
        .with_video_provider(youtube)
        .with_library(library.clone())
        .with_live_lookup(config.cache.live_lookup);
    info!("Track providers: {:?}", aggregator.provider_names());

    Ok(AppState {
        aggregator: Arc::new(aggregator),
        library,
        cache,
        transliterator,
        config,
    })
}

/// Periodically write the result cache when it has changed
fn start_snapshot_task(cache: Arc<SongCache>, interval_secs: u64) {
    if interval_secs == 0 {
        info!("Periodic cache snapshots disabled");
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await;
        loop {
            interval.tick().await;
            let cache = cache.clone();
            match tokio::task::spawn_blocking(move || cache.save_if_dirty()).await {
                Ok(Ok(Some(count))) => info!("Saved {} cached songs", count),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => warn!("Failed to save cache snapshot: {}", e),
                Err(e) => error!("Cache snapshot task failed: {}", e),
            }
        }
    });
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let (config, warnings) = load_config(&args);

    if let Err(e) = config.logging.initialize_logger() {
        eprintln!("Invalid logging configuration ({}), using defaults", e);
        if let Err(e) = initialize_default_logging() {
            eprintln!("Failed to initialize logging: {}", e);
        }
    }
    info!("KashiFind {} starting ({})", env!("CARGO_PKG_VERSION"), config.environment);
    if args.config.exists() {
        info!("Loaded configuration from {:?}", args.config);
    } else {
        warn!("Config file {:?} not found, using defaults", args.config);
    }
    for warning in &warnings {
        warn!("{}", warning);
    }

    let save_interval = config.cache.save_interval_secs;
    let state = match build_state(config) {
        Ok(state) => state,
        Err(e) => {
            error!("Startup failed: {}", e);
            process::exit(1);
        }
    };
    let cache = state.cache.clone();
    start_snapshot_task(cache.clone(), save_interval);

    if let Err(e) = start_rocket_server(state).await {
        error!("Webserver error: {}", e);
    }

    info!("Shutting down, saving cache");
    match cache.save_snapshot() {
        Ok(count) => info!("Saved {} cached songs", count),
        Err(e) => warn!("Failed to save cache snapshot: {}", e),
    }
}
