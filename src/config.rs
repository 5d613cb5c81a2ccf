use std::path::PathBuf;
use std::time::Duration;

/// Store-wide configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Fixed chunk size in bytes; every chunk but a file's last has exactly
    /// this length.
    pub chunk_size: usize,
    /// Directory holding the local chunk cache and materialized files.
    pub cache_dir: PathBuf,
    /// SQLite URL for the transfer state database.
    pub db_url: String,
    /// Bound on parallel chunk transfers per file operation.
    pub max_concurrent_transfers: usize,
    /// Serve downloads from the local cache when the chunk is already marked
    /// downloaded.
    pub use_cached_downloads: bool,
    /// Exponential backoff bounds for remote ledger calls.
    pub retry_initial_interval: Duration,
    pub retry_max_interval: Duration,
    pub retry_max_elapsed: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024,
            cache_dir: PathBuf::from("weavestore-cache"),
            db_url: "sqlite::memory:".to_string(),
            max_concurrent_transfers: 16,
            use_cached_downloads: true,
            retry_initial_interval: Duration::from_millis(100),
            retry_max_interval: Duration::from_secs(2),
            retry_max_elapsed: Duration::from_secs(30),
        }
    }
}
