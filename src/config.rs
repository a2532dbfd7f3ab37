// Configuration for KashiFind
//
// The configuration file is JSON. Service sections live in a "services"
// subtree; top-level service sections are still accepted.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde_json::Value;
use thiserror::Error;

use crate::constants::{DEFAULT_FRONTEND_URL, DEFAULT_PORT};
use crate::helpers::lyrics::DEFAULT_MIN_LYRICS_LENGTH;
use crate::helpers::retry::DEFAULT_RATE_LIMIT_BACKOFF_MS;
use crate::helpers::songcache::DEFAULT_CACHE_CAPACITY;
use crate::logging::LoggingConfig;
use crate::providers::{GeniusConfig, SpotifyConfig, YouTubeConfig};

pub const DEFAULT_CONFIG_FILE: &str = "kashifind.json";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SAVE_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Helper function to get service configuration with backward compatibility
///
/// The service is looked up in the "services" structure first, then at the top level.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use kashifind::config::get_service_config;
///
/// let config = json!({
///   "services": {
///     "genius": { "enable": true }
///   },
///   "spotify": { "enable": false }
/// });
///
/// assert_eq!(get_service_config(&config, "genius").unwrap()["enable"], true);
/// assert_eq!(get_service_config(&config, "spotify").unwrap()["enable"], false);
/// assert!(get_service_config(&config, "youtube").is_none());
/// ```
pub fn get_service_config<'a>(config: &'a Value, service_name: &str) -> Option<&'a Value> {
    if let Some(service_config) = config.get("services").and_then(|s| s.get(service_name)) {
        debug!("Found {} configuration in services section", service_name);
        return Some(service_config);
    }

    if let Some(service_config) = config.get(service_name) {
        debug!("Found {} configuration at top level (legacy structure)", service_name);
        return Some(service_config);
    }

    debug!("No {} configuration found", service_name);
    None
}

fn get_str(section: Option<&Value>, key: &str) -> Option<String> {
    section
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn get_u64(section: Option<&Value>, key: &str) -> Option<u64> {
    section.and_then(|s| s.get(key)).and_then(|v| v.as_u64())
}

fn get_bool(section: Option<&Value>, key: &str) -> Option<bool> {
    section.and_then(|s| s.get(key)).and_then(|v| v.as_bool())
}

#[derive(Debug, Clone)]
pub struct WebServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub retry_backoff_ms: u64,
}

impl HttpConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone)]
pub struct LyricsConfig {
    pub enable: bool,
    pub min_length: usize,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub file: PathBuf,
    pub capacity: usize,
    pub save_interval_secs: u64,
    pub live_lookup: bool,
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub dbfile: PathBuf,
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub webserver: WebServerConfig,
    pub http: HttpConfig,
    pub spotify: SpotifyConfig,
    pub genius: GeniusConfig,
    pub youtube: YouTubeConfig,
    pub lyrics: LyricsConfig,
    pub cache: CacheConfig,
    pub library: LibraryConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig::from_json(&Value::Null)
    }
}

impl AppConfig {
    pub fn from_json(config: &Value) -> Self {
        let webserver = config.get("webserver");
        let http = config.get("http");
        let cache = config.get("cache");
        let library = config.get("library");
        let lyrics = get_service_config(config, "lyrics");

        AppConfig {
            environment: get_str(Some(config), "environment").unwrap_or_else(|| "development".to_string()),
            webserver: WebServerConfig {
                host: get_str(webserver, "host").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: get_u64(webserver, "port")
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(DEFAULT_PORT),
                frontend_url: get_str(webserver, "frontend_url").unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            },
            http: HttpConfig {
                timeout_secs: get_u64(http, "timeout_secs").unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
                retry_backoff_ms: get_u64(http, "retry_backoff_ms").unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF_MS),
            },
            spotify: SpotifyConfig::from_json(get_service_config(config, "spotify").unwrap_or(&Value::Null)),
            genius: GeniusConfig::from_json(get_service_config(config, "genius").unwrap_or(&Value::Null)),
            youtube: YouTubeConfig::from_json(get_service_config(config, "youtube").unwrap_or(&Value::Null)),
            lyrics: LyricsConfig {
                enable: get_bool(lyrics, "enable").unwrap_or(true),
                min_length: get_u64(lyrics, "min_length")
                    .map(|l| l as usize)
                    .unwrap_or(DEFAULT_MIN_LYRICS_LENGTH),
            },
            cache: CacheConfig {
                file: get_str(cache, "file").unwrap_or_else(|| "cache.json".to_string()).into(),
                capacity: get_u64(cache, "capacity")
                    .map(|c| c as usize)
                    .unwrap_or(DEFAULT_CACHE_CAPACITY),
                save_interval_secs: get_u64(cache, "save_interval_secs").unwrap_or(DEFAULT_SAVE_INTERVAL_SECS),
                live_lookup: get_bool(cache, "live_lookup").unwrap_or(true),
            },
            library: LibraryConfig {
                dbfile: get_str(library, "dbfile").unwrap_or_else(|| "library.db".to_string()).into(),
            },
            logging: LoggingConfig::from_json(config.get("logging")),
        }
    }

    /// Read the config file; a missing file yields the defaults
    ///
    /// Runs before the logger exists, so nothing is logged here.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(AppConfig::from_json(&value))
    }

    /// Apply overrides from environment variables, read through `lookup`.
    ///
    /// Returns warnings for the caller to log once logging is set up.
    pub fn apply_env<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut warnings = Vec::new();

        if let Some(client_id) = non_empty("SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = Some(client_id);
        }
        if let Some(client_secret) = non_empty("SPOTIFY_CLIENT_SECRET") {
            self.spotify.client_secret = Some(client_secret);
        }
        if let Some(api_key) = non_empty("GENIUS_API_KEY") {
            self.genius.api_key = Some(api_key);
        }
        if let Some(api_key) = non_empty("YOUTUBE_API_KEY") {
            self.youtube.api_key = Some(api_key);
        }
        if let Some(port) = non_empty("PORT") {
            match port.trim().parse() {
                Ok(port) => self.webserver.port = port,
                Err(_) => warnings.push(format!("Ignoring invalid PORT value '{}'", port)),
            }
        }
        if let Some(frontend_url) = non_empty("FRONTEND_URL") {
            self.webserver.frontend_url = frontend_url;
        }
        if let Some(environment) = non_empty("NODE_ENV") {
            self.environment = environment;
        }
        if non_empty("MONGODB_URI").is_some() {
            warnings.push(format!(
                "MONGODB_URI is set but not supported, songs are stored in {:?}",
                self.library.dbfile
            ));
        }
        warnings
    }

    /// Error details are hidden from clients in production
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
