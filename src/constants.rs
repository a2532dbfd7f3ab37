/// Prefix for all API routes
pub const API_PREFIX: &str = "/api";

/// Default webserver port
pub const DEFAULT_PORT: u16 = 3001;

/// Default origin allowed by the CORS fairing
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

/// User agent sent when a provider serves HTML pages to browsers only
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default user agent for JSON API calls
pub const USER_AGENT: &str = concat!("KashiFind/", env!("CARGO_PKG_VERSION"));
