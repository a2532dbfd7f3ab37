use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use kashifind::data::SongRecord;
use kashifind::helpers::songcache::{SongCache, SongStore, DEFAULT_CACHE_CAPACITY};

#[derive(Parser)]
#[command(name = "kashifind_dump_cache")]
#[command(about = "A tool to inspect and clean the KashiFind result cache snapshot")]
#[command(long_about = None)]
struct Cli {
    /// Path to the cache snapshot file
    #[arg(short, long, value_name = "FILE", default_value = "cache.json")]
    file: PathBuf,

    /// Maximum number of songs to load from the snapshot
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    capacity: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cached songs
    List {
        /// Only show songs from this source (spotify, genius)
        #[arg(short, long)]
        source: Option<String>,

        /// Show album, year, popularity and lyrics state
        #[arg(short, long)]
        detailed: bool,

        /// Limit number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show cache statistics
    Stats,
    /// Remove songs from the snapshot
    Clean {
        /// Remove songs from this source
        #[arg(short, long)]
        source: Option<String>,

        /// Remove songs that have no lyrics attached
        #[arg(long)]
        without_lyrics: bool,

        /// Remove all songs (use with caution!)
        #[arg(long)]
        all: bool,

        /// Dry run - show what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },
}

fn matches_source(record: &SongRecord, source: Option<&str>) -> bool {
    source.map_or(true, |s| record.source.as_str().eq_ignore_ascii_case(s))
}

fn print_song(key: &str, record: &SongRecord, detailed: bool) {
    println!("{}: {} - {}", key, record.artist, record.title);
    if detailed {
        println!("  Album: {}", record.album);
        if let Some(year) = record.year {
            println!("  Year: {}", year);
        }
        println!("  Popularity: {}", record.popularity);
        println!("  Lyrics: {:?}", record.lyrics_state);
        if let Some(url) = &record.url {
            println!("  URL: {}", url);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("Using cache snapshot: {}", cli.file.display());

    let cache = SongCache::with_snapshot(cli.capacity, &cli.file);
    cache.load_snapshot()?;

    match cli.command {
        Commands::List { source, detailed, limit } => {
            let entries: Vec<_> = cache
                .entries()
                .into_iter()
                .filter(|(_, record)| matches_source(record, source.as_deref()))
                .take(limit.unwrap_or(usize::MAX))
                .collect();
            for (key, record) in &entries {
                print_song(key, record, detailed);
            }
            println!("\nShowing {} of {} cached songs", entries.len(), cache.len());
        }
        Commands::Stats => {
            let stats = cache.stats();
            println!("Cache Statistics:");
            println!("  Snapshot: {}", cli.file.display());
            println!("  Songs: {} (capacity {})", stats.entries, stats.capacity);
            println!("  With lyrics: {}", stats.with_lyrics);
            println!("  By source:");
            for (source, count) in &stats.by_source {
                println!("    {}: {}", source, count);
            }
        }
        Commands::Clean {
            source,
            without_lyrics,
            all,
            dry_run,
        } => {
            if !all && source.is_none() && !without_lyrics {
                return Err("Specify --all, --source or --without-lyrics".into());
            }
            let selected = |record: &SongRecord| {
                all || (matches_source(record, source.as_deref()) && (!without_lyrics || !record.has_lyrics()))
            };

            if dry_run {
                let count = cache
                    .entries()
                    .iter()
                    .filter(|(key, record)| {
                        let hit = selected(record);
                        if hit {
                            println!("Would remove {}", key);
                        }
                        hit
                    })
                    .count();
                println!("Dry run: {} songs would be removed", count);
                return Ok(());
            }

            let removed = cache.remove_where(|_, record| selected(record));
            if removed > 0 {
                cache.save_snapshot()?;
            }
            println!("Removed {} songs, {} remaining", removed, cache.len());
        }
    }

    Ok(())
}
