//! Runtime configuration assembled from environment variables.

use std::env;

use crate::constants::DEFAULT_RATE_LIMIT_PER_MINUTE;

/// Process configuration. Every field has a default so a bare environment
/// boots a self-contained server with the hash embedder and a local file.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Host the API locally (true) or forward tool calls to a remote
    /// webrecall instance (false).
    pub is_server: bool,
    /// Run the RAM working set with differential disk sync.
    pub use_memory_db: bool,
    pub server_host: String,
    pub server_port: u16,
    /// External crawl service endpoint.
    pub crawler_url: String,
    /// Disk database path.
    pub db_path: String,
    /// Bearer token expected by the API.
    pub api_key: Option<String>,
    pub rate_limit_per_minute: u32,
    /// Out-of-band token authorizing block-pattern removal.
    pub block_removal_token: Option<String>,
    /// Remote instance for client-forward mode.
    pub remote_api_url: Option<String>,
    pub remote_api_key: Option<String>,
    /// Embedding service; unset selects the deterministic hash embedder.
    pub embedder_url: Option<String>,
    /// Knowledge-graph service; unset marks KG queue rows skipped.
    pub kg_service_url: Option<String>,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(
            v.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            is_server: true,
            use_memory_db: true,
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            crawler_url: "http://localhost:11235/crawl".to_string(),
            db_path: "webrecall.db".to_string(),
            api_key: None,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            block_removal_token: None,
            remote_api_url: None,
            remote_api_key: None,
            embedder_url: None,
            kg_service_url: None,
        }
    }
}

impl RuntimeConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        let defaults = RuntimeConfig::default();
        RuntimeConfig {
            is_server: env_bool("IS_SERVER", defaults.is_server),
            use_memory_db: env_bool("USE_MEMORY_DB", defaults.use_memory_db),
            server_host: env_string("SERVER_HOST", &defaults.server_host),
            server_port: env_parse("SERVER_PORT", defaults.server_port),
            crawler_url: env_string("CRAWLER_URL", &defaults.crawler_url),
            db_path: env_string("DB_PATH", &defaults.db_path),
            api_key: env_opt("API_KEY"),
            rate_limit_per_minute: env_parse(
                "RATE_LIMIT_PER_MINUTE",
                defaults.rate_limit_per_minute,
            ),
            block_removal_token: env_opt("BLOCK_REMOVAL_TOKEN"),
            remote_api_url: env_opt("REMOTE_API_URL"),
            remote_api_key: env_opt("REMOTE_API_KEY"),
            embedder_url: env_opt("EMBEDDER_URL"),
            kg_service_url: env_opt("KG_SERVICE_URL"),
        }
    }
}
