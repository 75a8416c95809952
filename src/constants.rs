// Constants module for shared string constants

pub const CONFIG_DIR: &str = "mcup";
pub const CONFIG_FILE: &str = "config.yaml";
pub const CACHE_DIR: &str = "cache";
pub const PLUGINS_DIR: &str = "plugins";

/// User-Agent string for all HTTP requests
pub const USER_AGENT: &str = concat!("mcup/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout for API calls and downloads
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_PARALLEL_DOWNLOADS: usize = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Upper bound for the wait between two download attempts
pub const MAX_RETRY_WAIT_SECS: u64 = 10;

/// Media types accepted for a downloadable jar
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/java-archive",
    "application/octet-stream",
    "application/zip",
];

/// Placeholder hashes for an artifact that is not on disk. No real digest
/// can equal them, so any remote comparison reports a difference.
pub const IMPOSSIBLE_HASHES: [&str; 4] = ["a", "b", "c", "d"];

/// Suffix of the staging file used while a new plugin jar is downloaded
pub const LATEST_SUFFIX: &str = "[Latest].jar";
