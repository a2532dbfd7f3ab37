use std::collections::BTreeMap;
use std::io::Write;

use env_logger::{Builder, Target, WriteStyle};
use log::{info, LevelFilter};
use serde::{Deserialize, Serialize};

/// Available logging subsystems in KashiFind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingSubsystem {
    /// Main application and startup
    Main,
    /// HTTP API routes
    Api,
    /// Spotify, Genius, YouTube and lyrics.ovh adapters
    Providers,
    /// Result cache and its snapshot
    Cache,
    /// SQLite song library
    Library,
    /// Search aggregation and local scoring
    Search,
    /// Japanese reading generation
    Transliteration,
    /// HTTP client operations
    Http,
    /// Configuration loading
    Config,
    /// Third-party dependencies
    #[serde(alias = "dependencies")]
    Deps,
}

impl LoggingSubsystem {
    /// Get the module prefixes for this subsystem
    pub fn module_prefix(&self) -> &'static str {
        match self {
            LoggingSubsystem::Main => "kashifind",
            LoggingSubsystem::Api => "kashifind::api",
            LoggingSubsystem::Providers => "kashifind::providers,kashifind::helpers::lyrics",
            LoggingSubsystem::Cache => "kashifind::helpers::songcache",
            LoggingSubsystem::Library => "kashifind::helpers::songlibrary",
            LoggingSubsystem::Search => "kashifind::search",
            LoggingSubsystem::Transliteration => "kashifind::helpers::transliteration",
            LoggingSubsystem::Http => "kashifind::helpers::http_client,kashifind::helpers::ratelimit,reqwest,hyper",
            LoggingSubsystem::Config => "kashifind::config",
            LoggingSubsystem::Deps => "rocket,rusqlite",
        }
    }

    pub fn parse(name: &str) -> Option<LoggingSubsystem> {
        match name.to_lowercase().as_str() {
            "main" => Some(LoggingSubsystem::Main),
            "api" => Some(LoggingSubsystem::Api),
            "providers" => Some(LoggingSubsystem::Providers),
            "cache" => Some(LoggingSubsystem::Cache),
            "library" => Some(LoggingSubsystem::Library),
            "search" => Some(LoggingSubsystem::Search),
            "transliteration" => Some(LoggingSubsystem::Transliteration),
            "http" => Some(LoggingSubsystem::Http),
            "config" => Some(LoggingSubsystem::Config),
            "deps" | "dependencies" => Some(LoggingSubsystem::Deps),
            _ => None,
        }
    }
}

/// Logging configuration, the `logging` section of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (off, error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// stdout or stderr
    #[serde(default = "default_target")]
    pub target: String,

    #[serde(default = "default_true")]
    pub timestamps: bool,

    #[serde(default = "default_true")]
    pub colors: bool,

    /// Subsystem (or raw module path) to level
    #[serde(default)]
    pub subsystems: BTreeMap<String, String>,

    #[serde(default)]
    pub include_module_path: bool,

    #[serde(default)]
    pub include_line_numbers: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_target() -> String {
    "stdout".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            target: default_target(),
            timestamps: true,
            colors: true,
            subsystems: BTreeMap::new(),
            include_module_path: false,
            include_line_numbers: false,
        }
    }
}

impl LoggingConfig {
    /// Read the `logging` section, falling back to defaults when it is missing or malformed
    pub fn from_json(logging_config: Option<&serde_json::Value>) -> Self {
        match logging_config {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                eprintln!("Warning: invalid logging configuration ({}), using defaults", e);
                LoggingConfig::default()
            }),
            None => LoggingConfig::default(),
        }
    }

    /// Convert string log level to LevelFilter
    fn parse_log_level(level: &str) -> LevelFilter {
        match level.to_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => {
                eprintln!("Warning: Unknown log level '{}', defaulting to 'info'", level);
                LevelFilter::Info
            }
        }
    }

    /// Module filters as (module prefix, level) pairs
    fn module_filters(&self) -> Vec<(String, &str)> {
        let mut filters = Vec::new();
        for (name, level) in &self.subsystems {
            match LoggingSubsystem::parse(name) {
                Some(subsystem) => {
                    for prefix in subsystem.module_prefix().split(',') {
                        filters.push((prefix.trim().to_string(), level.as_str()));
                    }
                }
                None => filters.push((name.clone(), level.as_str())),
            }
        }
        filters
    }

    /// The filter in env_logger's `RUST_LOG` syntax
    pub fn build_filter_string(&self) -> String {
        let mut parts = vec![self.level.clone()];
        for (module, level) in self.module_filters() {
            parts.push(format!("{}={}", module, level));
        }
        parts.join(",")
    }

    /// Initialize the logger with this configuration
    pub fn initialize_logger(&self) -> Result<(), String> {
        let mut builder = Builder::new();
        builder.filter(None, Self::parse_log_level(&self.level));
        for (module, level) in self.module_filters() {
            builder.filter(Some(module.as_str()), Self::parse_log_level(level));
        }
        // RUST_LOG wins over the file
        builder.parse_env("RUST_LOG");

        builder.write_style(if self.colors { WriteStyle::Auto } else { WriteStyle::Never });

        match self.target.to_lowercase().as_str() {
            "stdout" => {
                builder.target(Target::Stdout);
            }
            "stderr" => {
                builder.target(Target::Stderr);
            }
            other => return Err(format!("Unknown logging target: {}", other)),
        }

        let include_module_path = self.include_module_path;
        let include_line_numbers = self.include_line_numbers;
        let timestamps = self.timestamps;

        builder.format(move |buf, record| {
            let mut output = String::new();

            if timestamps {
                output.push_str(&format!("[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
            }
            output.push_str(&format!("[{}] ", record.level()));

            if include_module_path {
                if let Some(module) = record.module_path() {
                    output.push_str(&format!("[{}] ", module));
                }
            }
            if include_line_numbers {
                if let (Some(file), Some(line)) = (record.file(), record.line()) {
                    output.push_str(&format!("[{}:{}] ", file, line));
                }
            }

            output.push_str(&record.args().to_string());
            writeln!(buf, "{}", output)
        });

        builder
            .try_init()
            .map_err(|e| format!("Failed to initialize logger: {}", e))?;

        info!("Logging initialized with filter: {}", self.build_filter_string());
        Ok(())
    }
}

/// Initialize logging with default configuration
pub fn initialize_default_logging() -> Result<(), String> {
    LoggingConfig::default().initialize_logger()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_string_expands_subsystems() {
        let config = LoggingConfig::from_json(Some(&json!({
            "level": "warn",
            "subsystems": {"providers": "debug", "kashifind::api::songs": "trace"}
        })));
        assert_eq!(
            config.build_filter_string(),
            "warn,kashifind::api::songs=trace,kashifind::providers=debug,kashifind::helpers::lyrics=debug"
        );
    }

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::from_json(None);
        assert_eq!(config.level, "info");
        assert_eq!(config.target, "stdout");
        assert!(config.timestamps);
        assert_eq!(config.build_filter_string(), "info");

        let malformed = LoggingConfig::from_json(Some(&json!({"level": 3})));
        assert_eq!(malformed.level, "info");
    }

    #[test]
    fn test_parse_subsystem() {
        assert_eq!(LoggingSubsystem::parse("Cache"), Some(LoggingSubsystem::Cache));
        assert_eq!(LoggingSubsystem::parse("dependencies"), Some(LoggingSubsystem::Deps));
        assert_eq!(LoggingSubsystem::parse("players"), None);
    }
}
