//! Depth-first deep crawler with page, depth, and wall-clock bounds.
//!
//! The crawler owns traversal: it fetches each page once, extracts a capped
//! number of outbound links from the rendered HTML, and hands accepted
//! pages to the ingestion pipeline for storage. Per-URL failures land in
//! the aggregate report; they never abort the crawl.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::clean;
use crate::constants::{LINKS_PER_PAGE, MAX_CRAWL_DEPTH, MAX_CRAWL_PAGES};
use crate::error::Result;
use crate::fetch::PageFetcher;
use crate::ingest::{IngestOptions, IngestionPipeline};
use crate::types::RetentionPolicy;
use crate::validate;

/// File extensions that never hold crawlable content.
const SKIP_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".mjs", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".pdf",
    ".zip", ".tar", ".gz", ".rar", ".7z", ".mp3", ".mp4", ".avi", ".mov", ".woff", ".woff2",
    ".ttf", ".eot", ".xml", ".rss",
];

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#"href\s*=\s*["']([^"'<>\s]+)["']"#).unwrap()
});

/// Deep crawl bounds and policy.
#[derive(Debug, Clone)]
pub struct DeepCrawlOptions {
    pub max_depth: u32,
    pub max_pages: u32,
    pub include_external: bool,
    /// Minimum clean-quality score (`1 − reduction`) a page must reach to
    /// be stored; its links are followed either way.
    pub score_threshold: Option<f32>,
    pub timeout: Duration,
    pub retention: RetentionPolicy,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    /// Store accepted pages (deep_crawl_and_store) or only preview them.
    pub store: bool,
}

impl Default for DeepCrawlOptions {
    fn default() -> Self {
        DeepCrawlOptions {
            max_depth: 2,
            max_pages: 20,
            include_external: false,
            score_threshold: None,
            timeout: Duration::from_secs(300),
            retention: RetentionPolicy::Permanent,
            tags: Vec::new(),
            session_id: None,
            store: true,
        }
    }
}

impl DeepCrawlOptions {
    /// Clamp depth and page count to the system-wide ceilings.
    pub fn clamped(mut self) -> Self {
        self.max_depth = self.max_depth.min(MAX_CRAWL_DEPTH);
        self.max_pages = self.max_pages.clamp(1, MAX_CRAWL_PAGES);
        self
    }
}

/// One page outcome inside the aggregate report.
#[derive(Debug, Clone, Serialize)]
pub struct CrawledPage {
    pub url: String,
    pub depth: u32,
    pub title: String,
    pub content_id: Option<i64>,
    pub chunks_stored: usize,
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedPage {
    pub url: String,
    pub depth: u32,
    pub error: String,
}

/// Why the crawl stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    FrontierExhausted,
    PageBudget,
    Deadline,
}

/// Aggregate deep crawl report.
#[derive(Debug, Clone, Serialize)]
pub struct DeepCrawlReport {
    pub seed: String,
    pub stored: Vec<CrawledPage>,
    pub failed: Vec<FailedPage>,
    pub pages_visited: usize,
    pub duration_s: f64,
    pub stopped: StopReason,
}

/// DFS deep crawl driver.
pub struct DeepCrawler {
    pipeline: Arc<IngestionPipeline>,
    fetcher: Arc<dyn PageFetcher>,
}

impl DeepCrawler {
    pub fn new(pipeline: Arc<IngestionPipeline>, fetcher: Arc<dyn PageFetcher>) -> Self {
        DeepCrawler { pipeline, fetcher }
    }

    /// Crawl from `seed`, depth-first, honoring every bound in `options`.
    pub async fn crawl(&self, seed: &str, options: DeepCrawlOptions) -> Result<DeepCrawlReport> {
        let options = options.clamped();
        let seed = validate::url(seed)?;
        let seed_domain = crate::blocklist::host_of(&seed);
        let deadline = Instant::now() + options.timeout;
        let started = Instant::now();

        let mut frontier: Vec<(String, u32)> = vec![(seed.clone(), 0)];
        let mut visited: HashSet<String> = HashSet::new();
        let mut stored: Vec<CrawledPage> = Vec::new();
        let mut failed: Vec<FailedPage> = Vec::new();
        let mut stopped = StopReason::FrontierExhausted;

        while let Some((url, depth)) = frontier.pop() {
            if stored.len() + failed.len() >= options.max_pages as usize {
                stopped = StopReason::PageBudget;
                break;
            }
            if Instant::now() >= deadline {
                stopped = StopReason::Deadline;
                break;
            }
            if !visited.insert(url.clone()) {
                continue;
            }

            debug!(url = %url, depth, "visiting page");
            if let Err(err) = self.pipeline.check_blocklist(&url).await {
                failed.push(FailedPage {
                    url,
                    depth,
                    error: err.to_string(),
                });
                continue;
            }

            let page = match self.fetcher.fetch(&url).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(url = %url, error = %err, "deep crawl fetch failed");
                    failed.push(FailedPage {
                        url,
                        depth,
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            // Links come from the rendered HTML before any store decision,
            // so link discovery survives quality filtering.
            if depth + 1 <= options.max_depth {
                let links = extract_links(
                    &page.cleaned_html,
                    &url,
                    &seed_domain,
                    options.include_external,
                    &visited,
                );
                for link in links {
                    frontier.push((link, depth + 1));
                }
            }

            let report = clean::clean_markdown(&page.markdown, &url);
            let quality = 1.0 - report.reduction;
            if let Some(threshold) = options.score_threshold {
                if quality < threshold {
                    failed.push(FailedPage {
                        url,
                        depth,
                        error: format!("quality {quality:.2} below threshold {threshold:.2}"),
                    });
                    continue;
                }
            }

            if options.store {
                let opts = IngestOptions {
                    retention: options.retention.clone(),
                    tags: options.tags.clone(),
                    session_id: options.session_id.clone(),
                    batch_deadline: false,
                };
                match self.pipeline.store_fetched(&url, &page, opts).await {
                    Ok(ingested) => stored.push(CrawledPage {
                        url,
                        depth,
                        title: page.title,
                        content_id: ingested.content_id,
                        chunks_stored: ingested.chunks_stored,
                        preview: None,
                    }),
                    Err(err) => failed.push(FailedPage {
                        url,
                        depth,
                        error: err.to_string(),
                    }),
                }
            } else {
                let preview: String = report.text.chars().take(500).collect();
                stored.push(CrawledPage {
                    url,
                    depth,
                    title: page.title,
                    content_id: None,
                    chunks_stored: 0,
                    preview: Some(preview),
                });
            }
        }

        let crawl_report = DeepCrawlReport {
            seed,
            pages_visited: visited.len(),
            duration_s: started.elapsed().as_secs_f64(),
            stopped,
            stored,
            failed,
        };
        info!(
            seed = %crawl_report.seed,
            stored = crawl_report.stored.len(),
            failed = crawl_report.failed.len(),
            visited = crawl_report.pages_visited,
            stopped = ?crawl_report.stopped,
            "deep crawl finished"
        );
        Ok(crawl_report)
    }
}

/// Extract up to [`LINKS_PER_PAGE`] acceptable outbound links from HTML.
pub fn extract_links(
    html: &str,
    base_url: &str,
    seed_domain: &str,
    include_external: bool,
    visited: &HashSet<String>,
) -> Vec<String> {
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return Vec::new(),
    };

    let mut links = Vec::new();
    let mut seen = HashSet::new();
    for capture in HREF_RE.captures_iter(html) {
        if links.len() >= LINKS_PER_PAGE {
            break;
        }
        let raw = &capture[1];
        if raw.starts_with('#') || raw.starts_with("mailto:") || raw.starts_with("javascript:") {
            continue;
        }
        let Ok(mut resolved) = base.join(raw) else {
            continue;
        };
        resolved.set_fragment(None);
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }

        let path_lower = resolved.path().to_lowercase();
        if SKIP_EXTENSIONS.iter().any(|ext| path_lower.ends_with(ext)) {
            continue;
        }

        let absolute = resolved.to_string();
        let domain = crate::blocklist::host_of(&absolute);
        if !include_external && domain != seed_domain {
            continue;
        }
        if absolute == base_url || visited.contains(&absolute) || !seen.insert(absolute.clone()) {
            continue;
        }
        links.push(absolute);
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_visited() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn extracts_and_resolves_links() {
        let html = r#"<a href="/docs/intro">intro</a> <a href="https://example.test/guide">g</a>"#;
        let links = extract_links(
            html,
            "https://example.test/",
            "example.test",
            false,
            &no_visited(),
        );
        assert_eq!(
            links,
            vec![
                "https://example.test/docs/intro".to_string(),
                "https://example.test/guide".to_string()
            ]
        );
    }

    #[test]
    fn drops_asset_extensions_and_fragments() {
        let html = r##"
            <a href="/style.css">c</a>
            <a href="/logo.png">l</a>
            <a href="#section">s</a>
            <a href="mailto:x@example.test">m</a>
            <a href="/page">p</a>
        "##;
        let links = extract_links(
            html,
            "https://example.test/",
            "example.test",
            false,
            &no_visited(),
        );
        assert_eq!(links, vec!["https://example.test/page".to_string()]);
    }

    #[test]
    fn same_domain_policy() {
        let html = r#"<a href="https://other.test/x">o</a> <a href="/local">l</a>"#;
        let local_only = extract_links(
            html,
            "https://example.test/",
            "example.test",
            false,
            &no_visited(),
        );
        assert_eq!(local_only, vec!["https://example.test/local".to_string()]);

        let with_external = extract_links(
            html,
            "https://example.test/",
            "example.test",
            true,
            &no_visited(),
        );
        assert_eq!(with_external.len(), 2);
    }

    #[test]
    fn caps_links_per_page() {
        let mut html = String::new();
        for i in 0..20 {
            html.push_str(&format!(r#"<a href="/page{i}">p</a>"#));
        }
        let links = extract_links(
            &html,
            "https://example.test/",
            "example.test",
            false,
            &no_visited(),
        );
        assert_eq!(links.len(), LINKS_PER_PAGE);
    }

    #[test]
    fn skips_visited_and_duplicate_links() {
        let html = r#"<a href="/a">a</a> <a href="/a">a2</a> <a href="/b">b</a>"#;
        let mut visited = HashSet::new();
        visited.insert("https://example.test/b".to_string());
        let links = extract_links(html, "https://example.test/", "example.test", false, &visited);
        assert_eq!(links, vec!["https://example.test/a".to_string()]);
    }

    #[test]
    fn options_clamp_to_system_bounds() {
        let options = DeepCrawlOptions {
            max_depth: 99,
            max_pages: 10_000,
            ..DeepCrawlOptions::default()
        }
        .clamped();
        assert_eq!(options.max_depth, MAX_CRAWL_DEPTH);
        assert_eq!(options.max_pages, MAX_CRAWL_PAGES);
    }
}
