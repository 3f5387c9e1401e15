use book_cache::{DEFAULT_HIGH_WATER_MARK, DEFAULT_LOW_WATER_MARK};
use std::env;
use std::path::PathBuf;

/// Reader service configuration parsed from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    pub port: u16,
    pub library_url: String,
    /// Filesystem prefix of the paths in the library listing
    pub library_root: Option<String>,
    pub library_timeout_secs: u64,
    pub cache_db_path: PathBuf,
    /// Byte budget for the cache database; 0 disables eviction
    pub quota_bytes: u64,
    pub high_water_mark: f64,
    pub low_water_mark: f64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            library_url: "http://localhost:3000".to_string(),
            library_root: None,
            library_timeout_secs: 30,
            cache_db_path: PathBuf::from("./cache/books.db"),
            quota_bytes: 1024 * 1024 * 1024, // 1GB
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
        }
    }
}

impl ReaderConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from an arbitrary key lookup, falling back to
    /// defaults for missing or unparsable values
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = lookup("PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let library_url = lookup("LIBRARY_URL").unwrap_or(defaults.library_url);

        let library_root = lookup("LIBRARY_ROOT").filter(|s| !s.trim().is_empty());

        let library_timeout_secs = lookup("LIBRARY_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.library_timeout_secs);

        let cache_db_path = lookup("CACHE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_db_path);

        let quota_bytes = lookup("CACHE_QUOTA_BYTES")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.quota_bytes);

        let high_water_mark = lookup("CACHE_HIGH_WATER_MARK")
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(defaults.high_water_mark);

        let low_water_mark = lookup("CACHE_LOW_WATER_MARK")
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(defaults.low_water_mark);

        Self {
            port,
            library_url,
            library_root,
            library_timeout_secs,
            cache_db_path,
            quota_bytes,
            high_water_mark,
            low_water_mark,
        }
    }
}
