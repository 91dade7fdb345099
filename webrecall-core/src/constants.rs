//! Fixed limits and geometry shared across the workspace.

/// Dimension of every stored embedding vector.
pub const EMBEDDING_DIM: usize = 384;

/// Words per chunk window.
pub const CHUNK_SIZE_WORDS: usize = 500;

/// Words of overlap between consecutive chunk windows.
pub const CHUNK_OVERLAP_WORDS: usize = 50;

/// Minimum words for a chunk to survive quality filtering.
pub const MIN_CHUNK_WORDS: usize = 10;

/// Chunks kept when filtering would otherwise drop everything.
pub const SAFETY_FLOOR_CHUNKS: usize = 3;

/// Over-fetch multiplier applied before URL-level dedup in search.
pub const SEARCH_OVERFETCH_FACTOR: u32 = 4;

/// Absolute cap on vector hits requested from the index.
pub const SEARCH_HARD_MAX: u32 = 1000;

/// Field length caps enforced by the validator.
pub const MAX_URL_LEN: usize = 2048;
pub const MAX_QUERY_LEN: usize = 1000;
pub const MAX_TAG_LEN: usize = 100;
pub const MAX_TAGS_LEN: usize = 500;
pub const MAX_PATTERN_LEN: usize = 200;
pub const MIN_PATTERN_LEN: usize = 2;
pub const MAX_DESCRIPTION_LEN: usize = 1000;
pub const MAX_TITLE_LEN: usize = 500;

/// Deep crawl bounds.
pub const MAX_CRAWL_DEPTH: u32 = 5;
pub const MAX_CRAWL_PAGES: u32 = 250;
pub const LINKS_PER_PAGE: usize = 5;

/// Fetch deadlines in seconds.
pub const FETCH_TIMEOUT_SECS: u64 = 30;
pub const BATCH_FETCH_TIMEOUT_SECS: u64 = 60;

/// Batch driver defaults.
pub const BATCH_MAX_CONCURRENT: usize = 10;
pub const BATCH_URL_TIMEOUT_SECS: u64 = 60;
pub const BATCH_PROGRESS_EVERY: usize = 50;

/// Sync manager timing.
pub const SYNC_IDLE_TICK_SECS: u64 = 1;
pub const SYNC_IDLE_AFTER_SECS: u64 = 5;
pub const SYNC_PERIODIC_SECS: u64 = 300;

/// Write retry policy for busy/locked databases.
pub const WRITE_RETRY_ATTEMPTS: u32 = 5;
pub const WRITE_RETRY_BASE_MS: u64 = 10;
pub const WRITE_RETRY_MAX_MS: u64 = 200;

/// Default rolling-window rate limit per API key.
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 60;
