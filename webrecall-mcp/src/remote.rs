//! Client-forward mode: tool calls are translated to HTTP requests against
//! a remote webrecall instance instead of a local engine.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use webrecall_core::error::{Error, Result};

/// HTTP client for a remote webrecall API.
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

enum Route {
    Get(String),
    Post(String),
    Delete(String),
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(330))
            .build()
            .map_err(|e| Error::Storage(format!("failed to build remote client: {e}")))?;
        Ok(RemoteClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn query_pair(args: &Value, key: &str) -> String {
        args.get(key)
            .and_then(Value::as_str)
            .map(|v| format!("{key}={}", urlencode(v)))
            .unwrap_or_default()
    }

    fn route_for(name: &str, args: &Value) -> Result<Route> {
        let route = match name {
            "crawl_url" => Route::Post("/api/v1/crawl".to_string()),
            "crawl_and_remember" => Route::Post("/api/v1/crawl/store".to_string()),
            "crawl_temp" => Route::Post("/api/v1/crawl/temp".to_string()),
            "deep_crawl_dfs" => Route::Post("/api/v1/crawl/deep".to_string()),
            "deep_crawl_and_store" => Route::Post("/api/v1/crawl/deep/store".to_string()),
            "search_memory" => Route::Post("/api/v1/search".to_string()),
            "target_search" => Route::Post("/api/v1/search/target".to_string()),
            "list_memory" => {
                let mut path = "/api/v1/memory?".to_string();
                path.push_str(&Self::query_pair(args, "filter"));
                Route::Get(path)
            }
            "forget_url" => {
                let url = args
                    .get("url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::validation("url", "required"))?;
                Route::Delete(format!("/api/v1/memory?url={}", urlencode(url)))
            }
            "clear_temp_memory" => Route::Delete("/api/v1/memory/temp".to_string()),
            "get_database_stats" => Route::Get("/api/v1/db/stats".to_string()),
            "list_domains" => Route::Get("/api/v1/domains".to_string()),
            "block_domain" => Route::Post("/api/v1/blocked-domains".to_string()),
            "unblock_domain" => {
                let pattern = args
                    .get("pattern")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::validation("pattern", "required"))?;
                let keyword = args
                    .get("keyword")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Route::Delete(format!(
                    "/api/v1/blocked-domains?pattern={}&keyword={}",
                    urlencode(pattern),
                    urlencode(keyword)
                ))
            }
            "list_blocked_domains" => Route::Get("/api/v1/blocked-domains".to_string()),
            unknown => return Err(Error::NotFound(format!("unknown tool '{unknown}'"))),
        };
        Ok(route)
    }

    /// Forward one tool call; the remote answers with the same envelope the
    /// local dispatcher would produce.
    pub async fn forward(&self, name: &str, args: &Value) -> Result<Value> {
        let route = Self::route_for(name, args)?;
        debug!(tool = name, "forwarding tool call to remote");

        let request = match route {
            Route::Get(path) => self.client.get(format!("{}{path}", self.base_url)),
            Route::Delete(path) => self.client.delete(format!("{}{path}", self.base_url)),
            Route::Post(path) => self
                .client
                .post(format!("{}{path}", self.base_url))
                .json(args),
        };

        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("remote call failed: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| Error::Storage(format!("unreadable remote response: {e}")))
    }
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
