//! Client for the external crawl/render service.
//!
//! The service accepts a batch of URLs and returns cleaned HTML plus two
//! markdown renderings per page; `fit_markdown` is preferred and
//! `raw_markdown` is the fallback. The client only performs individual
//! requests; crawl-tree traversal is the deep crawler's job.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::constants::{BATCH_FETCH_TIMEOUT_SECS, FETCH_TIMEOUT_SECS};
use crate::error::{Error, FetchKind, Result};
use crate::types::FetchedPage;
use crate::validate;

/// Fetches one page through the crawl service.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch and render a single URL with the default single-page deadline.
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;

    /// Fetch with the longer batch deadline.
    async fn fetch_for_batch(&self, url: &str) -> Result<FetchedPage> {
        self.fetch(url).await
    }
}

#[derive(Debug, Serialize)]
struct CrawlRequest<'a> {
    urls: Vec<&'a str>,
    word_count_threshold: u32,
    excluded_tags: Vec<&'static str>,
    remove_forms: bool,
    only_text: bool,
}

impl<'a> CrawlRequest<'a> {
    fn for_url(url: &'a str) -> Self {
        CrawlRequest {
            urls: vec![url],
            word_count_threshold: 10,
            excluded_tags: vec![
                "nav", "header", "footer", "aside", "script", "style", "noscript",
            ],
            remove_forms: true,
            only_text: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct CrawlMarkdown {
    #[serde(default)]
    fit_markdown: Option<String>,
    #[serde(default)]
    raw_markdown: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrawlMetadata {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrawlPageResult {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    cleaned_html: Option<String>,
    #[serde(default)]
    markdown: Option<CrawlMarkdown>,
    #[serde(default)]
    metadata: Option<CrawlMetadata>,
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrawlResponse {
    #[serde(default)]
    results: Vec<CrawlPageResult>,
}

/// HTTP client for a crawl4ai-compatible endpoint.
pub struct CrawlClient {
    client: reqwest::Client,
    batch_client: reqwest::Client,
    endpoint: String,
}

impl CrawlClient {
    /// Build a client for the given crawl endpoint (e.g.
    /// `http://crawler:11235/crawl`).
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let build = |secs: u64| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(secs))
                .build()
                .map_err(|e| Error::Fetch {
                    kind: FetchKind::Network,
                    message: format!("failed to build HTTP client: {e}"),
                })
        };
        Ok(CrawlClient {
            client: build(FETCH_TIMEOUT_SECS)?,
            batch_client: build(BATCH_FETCH_TIMEOUT_SECS)?,
            endpoint: endpoint.into(),
        })
    }

    async fn fetch_with(&self, client: &reqwest::Client, url: &str) -> Result<FetchedPage> {
        let url = validate::url(url)?;
        debug!(url = %url, "fetching page");

        let response = client
            .post(&self.endpoint)
            .json(&CrawlRequest::for_url(&url))
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    FetchKind::Timeout
                } else if e.is_connect() {
                    FetchKind::Network
                } else {
                    FetchKind::Http
                };
                Error::Fetch {
                    kind,
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch {
                kind: FetchKind::Http,
                message: format!("crawler answered {status}"),
            });
        }

        let body: CrawlResponse = response.json().await.map_err(|e| Error::Fetch {
            kind: FetchKind::Malformed,
            message: format!("unreadable crawler response: {e}"),
        })?;

        let page = body.results.into_iter().next().ok_or_else(|| Error::Fetch {
            kind: FetchKind::Malformed,
            message: "crawler returned no results".to_string(),
        })?;

        if page.success == Some(false) {
            return Err(Error::Fetch {
                kind: FetchKind::Http,
                message: page
                    .error_message
                    .unwrap_or_else(|| "crawler reported failure".to_string()),
            });
        }

        let markdown = page
            .markdown
            .unwrap_or_default();
        let markdown_text = markdown
            .fit_markdown
            .filter(|m| !m.trim().is_empty())
            .or(markdown.raw_markdown)
            .unwrap_or_default();

        Ok(FetchedPage {
            url: page.url.unwrap_or(url),
            title: page
                .metadata
                .and_then(|m| m.title)
                .unwrap_or_else(|| "Untitled".to_string()),
            cleaned_html: page.cleaned_html.unwrap_or_default(),
            markdown: markdown_text,
            status: page.status_code.unwrap_or(200),
        })
    }

    /// The request body shape, exposed for status/help output.
    pub fn request_shape() -> serde_json::Value {
        json!({
            "urls": ["<url>"],
            "word_count_threshold": 10,
            "excluded_tags": ["nav", "header", "footer", "aside", "script", "style", "noscript"],
            "remove_forms": true,
            "only_text": true,
        })
    }
}

#[async_trait]
impl PageFetcher for CrawlClient {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.fetch_with(&self.client, url).await
    }

    async fn fetch_for_batch(&self, url: &str) -> Result<FetchedPage> {
        self.fetch_with(&self.batch_client, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_service_contract() {
        let body = serde_json::to_value(CrawlRequest::for_url("https://example.test")).unwrap();
        assert_eq!(body["urls"], json!(["https://example.test"]));
        assert_eq!(body["word_count_threshold"], json!(10));
        assert_eq!(body["remove_forms"], json!(true));
        assert_eq!(body["only_text"], json!(true));
        assert_eq!(body["excluded_tags"][0], json!("nav"));
    }

    #[test]
    fn response_parsing_prefers_fit_markdown() {
        let raw = serde_json::json!({
            "results": [{
                "url": "https://example.test",
                "cleaned_html": "<p>hi</p>",
                "markdown": {"fit_markdown": "fit", "raw_markdown": "raw"},
                "metadata": {"title": "Example"},
                "status_code": 200
            }]
        });
        let parsed: CrawlResponse = serde_json::from_value(raw).unwrap();
        let page = &parsed.results[0];
        assert_eq!(page.markdown.as_ref().unwrap().fit_markdown.as_deref(), Some("fit"));
        assert_eq!(page.metadata.as_ref().unwrap().title.as_deref(), Some("Example"));
    }
}
