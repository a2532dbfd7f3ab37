pub mod http_client;
pub mod lyrics;
pub mod ratelimit;
pub mod retry;
pub mod songcache;
pub mod songlibrary;
pub mod transliteration;
