//! End-to-end pipeline tests over in-memory fakes: a map-backed content
//! store and a canned fetcher, with the deterministic hash embedder.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use webrecall_core::batch::{BatchDriver, BatchOptions};
use webrecall_core::crawler::{DeepCrawlOptions, DeepCrawler};
use webrecall_core::embed::{cosine_similarity, EmbeddingProvider, HashEmbedder};
use webrecall_core::error::{Error, FetchKind, Result};
use webrecall_core::fetch::PageFetcher;
use webrecall_core::ingest::{IngestOptions, IngestionPipeline};
use webrecall_core::search::SearchEngine;
use webrecall_core::storage::{ContentStore, SyncMetricsSnapshot};
use webrecall_core::types::{
    BlockPattern, ChunkHit, ContentSummary, DomainCount, FetchedPage, KgStatus, StoreOutcome,
    StoreStats, StoredDocument,
};

// ---------------------------------------------------------------------------
// Fakes

#[derive(Default)]
struct MemStoreInner {
    next_id: i64,
    docs: HashMap<String, (i64, StoredDocument)>,
    patterns: Vec<BlockPattern>,
    kg_rows: Vec<(i64, String, Option<String>)>,
    sessions: Vec<String>,
}

#[derive(Default)]
struct MemStore {
    inner: Mutex<MemStoreInner>,
}

impl MemStore {
    fn doc_count(&self) -> usize {
        self.inner.lock().docs.len()
    }

    fn chunks_for(&self, url: &str) -> usize {
        self.inner
            .lock()
            .docs
            .get(url)
            .map_or(0, |(_, doc)| doc.chunks.len())
    }

    fn kg_rows(&self) -> Vec<(i64, String, Option<String>)> {
        self.inner.lock().kg_rows.clone()
    }
}

#[async_trait]
impl ContentStore for MemStore {
    async fn store_document(&self, doc: StoredDocument) -> Result<StoreOutcome> {
        assert_eq!(doc.chunks.len(), doc.vectors.len(), "chunk/vector parity");
        let mut inner = self.inner.lock();
        let replaced = inner.docs.contains_key(&doc.url);
        let id = if let Some((id, _)) = inner.docs.get(&doc.url) {
            *id
        } else {
            inner.next_id += 1;
            inner.next_id
        };
        let chunks = doc.chunks.len();
        inner.docs.insert(doc.url.clone(), (id, doc));
        Ok(StoreOutcome {
            content_id: id,
            replaced,
            chunks_stored: chunks,
        })
    }

    async fn forget_url(&self, url: &str) -> Result<u64> {
        Ok(u64::from(self.inner.lock().docs.remove(url).is_some()))
    }

    async fn clear_session(&self, session_id: &str) -> Result<u64> {
        let mut inner = self.inner.lock();
        let before = inner.docs.len();
        inner
            .docs
            .retain(|_, (_, doc)| doc.session_id.as_deref() != Some(session_id));
        Ok((before - inner.docs.len()) as u64)
    }

    async fn list_content(
        &self,
        filter: Option<&str>,
        limit: u32,
        _offset: u32,
    ) -> Result<Vec<ContentSummary>> {
        let inner = self.inner.lock();
        Ok(inner
            .docs
            .values()
            .filter(|(_, doc)| filter.is_none_or(|f| doc.retention.as_token() == f))
            .take(limit as usize)
            .map(|(id, doc)| ContentSummary {
                id: *id,
                url: doc.url.clone(),
                title: doc.title.clone(),
                retention: doc.retention.as_token(),
                tags: doc.tags.join(","),
                timestamp: 0,
                preview: doc.cleaned.chars().take(80).collect(),
            })
            .collect())
    }

    async fn vector_search(&self, query: &[f32], k: u32) -> Result<Vec<ChunkHit>> {
        let inner = self.inner.lock();
        let mut hits: Vec<ChunkHit> = inner
            .docs
            .values()
            .flat_map(|(id, doc)| {
                doc.chunks.iter().zip(&doc.vectors).map(move |(chunk, vec)| ChunkHit {
                    chunk_id: *id * 1000 + chunk.index as i64,
                    content_id: *id,
                    url: doc.url.clone(),
                    title: doc.title.clone(),
                    tags: doc.tags.join(","),
                    snippet: chunk.text.chars().take(100).collect(),
                    similarity: cosine_similarity(query, vec),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k as usize);
        Ok(hits)
    }

    async fn register_session(&self, session_id: &str) -> Result<()> {
        self.inner.lock().sessions.push(session_id.to_string());
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats::default())
    }

    async fn domain_counts(&self) -> Result<Vec<DomainCount>> {
        Ok(Vec::new())
    }

    async fn enqueue_kg(
        &self,
        content_id: i64,
        status: KgStatus,
        skipped_reason: Option<&str>,
    ) -> Result<()> {
        self.inner.lock().kg_rows.push((
            content_id,
            status.as_str().to_string(),
            skipped_reason.map(str::to_string),
        ));
        Ok(())
    }

    async fn sweep_expired(&self, _now_epoch: i64) -> Result<u64> {
        Ok(0)
    }

    async fn list_block_patterns(&self) -> Result<Vec<BlockPattern>> {
        Ok(self.inner.lock().patterns.clone())
    }

    async fn add_block_pattern(&self, pattern: &str, description: &str) -> Result<()> {
        self.inner.lock().patterns.push(BlockPattern {
            pattern: pattern.to_string(),
            description: description.to_string(),
            created_at: 0,
        });
        Ok(())
    }

    async fn remove_block_pattern(&self, pattern: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let before = inner.patterns.len();
        inner.patterns.retain(|p| p.pattern != pattern);
        Ok(inner.patterns.len() < before)
    }

    async fn sync_metrics(&self) -> Result<Option<SyncMetricsSnapshot>> {
        Ok(None)
    }
}

/// Serves canned pages keyed by URL; unknown URLs fail like the network.
#[derive(Default)]
struct StaticFetcher {
    pages: HashMap<String, FetchedPage>,
}

impl StaticFetcher {
    fn with_page(mut self, url: &str, title: &str, markdown: &str, html: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchedPage {
                url: url.to_string(),
                title: title.to_string(),
                cleaned_html: html.to_string(),
                markdown: markdown.to_string(),
                status: 200,
            },
        );
        self
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        self.pages.get(url).cloned().ok_or_else(|| Error::Fetch {
            kind: FetchKind::Network,
            message: format!("no route to {url}"),
        })
    }
}

fn words(n: usize) -> String {
    (0..n)
        .map(|i| format!("term{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn pipeline_over(
    store: &Arc<MemStore>,
    fetcher: StaticFetcher,
    kg_enabled: bool,
) -> Arc<IngestionPipeline> {
    let store: Arc<dyn ContentStore> = Arc::clone(store) as Arc<dyn ContentStore>;
    Arc::new(IngestionPipeline::new(
        store,
        Arc::new(fetcher),
        Arc::new(HashEmbedder::new()),
        kg_enabled,
    ))
}

// ---------------------------------------------------------------------------
// Tests

#[tokio::test]
async fn fresh_ingest_stores_expected_chunk_count() {
    let store = Arc::new(MemStore::default());
    let fetcher =
        StaticFetcher::default().with_page("https://example.test/a", "A", &words(1200), "");
    let pipeline = pipeline_over(&store, fetcher, false);

    let report = pipeline
        .ingest("https://example.test/a", IngestOptions::permanent(vec![]))
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.content_id.unwrap() >= 1);
    // ceil((1200 - 50) / 450) = 3 windows of 500 words with 50 overlap.
    assert_eq!(report.chunks_stored, 3);
    assert_eq!(store.doc_count(), 1);
    assert_eq!(store.chunks_for("https://example.test/a"), 3);
}

#[tokio::test]
async fn reingest_replaces_rather_than_duplicates() {
    let store = Arc::new(MemStore::default());
    let fetcher = StaticFetcher::default()
        .with_page("https://example.test/a", "A", &words(1200), "");
    let pipeline = pipeline_over(&store, fetcher, false);
    pipeline
        .ingest("https://example.test/a", IngestOptions::permanent(vec![]))
        .await
        .unwrap();

    let fetcher2 = StaticFetcher::default()
        .with_page("https://example.test/a", "A v2", &words(800), "");
    let pipeline2 = pipeline_over(&store, fetcher2, false);
    let second = pipeline2
        .ingest("https://example.test/a", IngestOptions::permanent(vec![]))
        .await
        .unwrap();

    assert_eq!(second.chunks_stored, 2);
    assert_eq!(store.doc_count(), 1);
    assert_eq!(store.chunks_for("https://example.test/a"), 2);
}

#[tokio::test]
async fn blocked_urls_are_rejected_without_writes() {
    let store = Arc::new(MemStore::default());
    store.add_block_pattern("*.blocked", "").await.unwrap();
    let fetcher =
        StaticFetcher::default().with_page("https://x.blocked/p", "X", &words(100), "");
    let pipeline = pipeline_over(&store, fetcher, false);

    let err = pipeline
        .ingest("https://x.blocked/p", IngestOptions::permanent(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Blocked { ref pattern } if pattern == "*.blocked"));
    assert_eq!(store.doc_count(), 0);
    assert!(store.kg_rows().is_empty());
}

#[tokio::test]
async fn fetch_failure_leaves_store_untouched() {
    let store = Arc::new(MemStore::default());
    let pipeline = pipeline_over(&store, StaticFetcher::default(), false);
    let err = pipeline
        .ingest("https://unreachable.test/", IngestOptions::permanent(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Fetch { .. }));
    assert_eq!(store.doc_count(), 0);
}

#[tokio::test]
async fn kg_rows_mark_skipped_without_service() {
    let store = Arc::new(MemStore::default());
    let fetcher =
        StaticFetcher::default().with_page("https://example.test/a", "A", &words(100), "");
    let pipeline = pipeline_over(&store, fetcher, false);
    pipeline
        .ingest("https://example.test/a", IngestOptions::permanent(vec![]))
        .await
        .unwrap();

    let rows = store.kg_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, "skipped");
    assert_eq!(rows[0].2.as_deref(), Some("kg_service_unavailable"));
}

#[tokio::test]
async fn search_dedups_by_url() {
    let store = Arc::new(MemStore::default());
    let fetcher = StaticFetcher::default()
        .with_page(
            "https://example.test/rust",
            "Rust",
            &format!("rust ownership borrowing lifetimes {}", words(700)),
            "",
        )
        .with_page(
            "https://example.test/tokio",
            "Tokio",
            &format!("rust tokio async runtime tasks {}", words(700)),
            "",
        )
        .with_page(
            "https://example.test/cooking",
            "Cooking",
            &format!("sourdough bread flour yeast {}", words(700)),
            "",
        );
    let pipeline = pipeline_over(&store, fetcher, false);
    for url in [
        "https://example.test/rust",
        "https://example.test/tokio",
        "https://example.test/cooking",
    ] {
        pipeline
            .ingest(url, IngestOptions::permanent(vec![]))
            .await
            .unwrap();
    }

    let engine = SearchEngine::new(
        Arc::clone(&store) as Arc<dyn ContentStore>,
        Arc::new(HashEmbedder::new()),
    );
    let hits = engine.search("rust async runtime", 2, None).await.unwrap();
    assert!(hits.len() <= 2);
    assert!(!hits.is_empty());
    let urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
    let mut unique = urls.clone();
    unique.dedup();
    assert_eq!(urls, unique, "no two hits share a URL");
}

#[tokio::test]
async fn tag_filter_is_any_match() {
    let store = Arc::new(MemStore::default());
    let fetcher = StaticFetcher::default()
        .with_page("https://example.test/a", "A", &words(100), "")
        .with_page("https://example.test/b", "B", &words(100), "");
    let pipeline = pipeline_over(&store, fetcher, false);
    pipeline
        .ingest(
            "https://example.test/a",
            IngestOptions::permanent(vec!["rust".to_string()]),
        )
        .await
        .unwrap();
    pipeline
        .ingest(
            "https://example.test/b",
            IngestOptions::permanent(vec!["python".to_string()]),
        )
        .await
        .unwrap();

    let engine = SearchEngine::new(
        Arc::clone(&store) as Arc<dyn ContentStore>,
        Arc::new(HashEmbedder::new()),
    );
    let hits = engine
        .search("term1 term2", 10, Some(&["rust".to_string()]))
        .await
        .unwrap();
    assert!(hits.iter().all(|h| h.tags.contains(&"rust".to_string())));
    assert!(!hits.is_empty());
}

#[tokio::test]
async fn target_search_discovers_and_reports_tags() {
    let store = Arc::new(MemStore::default());
    let fetcher = StaticFetcher::default()
        .with_page(
            "https://example.test/a",
            "A",
            &format!("tokio runtime scheduling {}", words(60)),
            "",
        )
        .with_page(
            "https://example.test/b",
            "B",
            &format!("tokio executor details {}", words(60)),
            "",
        );
    let pipeline = pipeline_over(&store, fetcher, false);
    pipeline
        .ingest(
            "https://example.test/a",
            IngestOptions::permanent(vec!["async".to_string(), "rust".to_string()]),
        )
        .await
        .unwrap();
    pipeline
        .ingest(
            "https://example.test/b",
            IngestOptions::permanent(vec!["async".to_string()]),
        )
        .await
        .unwrap();

    let engine = SearchEngine::new(
        Arc::clone(&store) as Arc<dyn ContentStore>,
        Arc::new(HashEmbedder::new()),
    );
    let result = engine
        .target_search("tokio runtime", 2, 5, None)
        .await
        .unwrap();
    assert!(result.expansion_used);
    assert_eq!(result.discovered_tags[0], "async");
    assert!(!result.results.is_empty());
    let urls: Vec<&str> = result.results.iter().map(|h| h.url.as_str()).collect();
    let mut unique = urls.clone();
    unique.dedup();
    assert_eq!(urls, unique);
}

#[tokio::test]
async fn deep_crawl_honors_page_and_depth_bounds() {
    let store = Arc::new(MemStore::default());
    // Seed links to 20 same-domain pages; each child links one level deeper.
    let mut fetcher = StaticFetcher::default();
    let mut seed_html = String::new();
    for i in 0..20 {
        seed_html.push_str(&format!(r#"<a href="/page{i}">p{i}</a>"#));
    }
    fetcher = fetcher.with_page(
        "https://example.test/",
        "Seed",
        &words(120),
        &seed_html,
    );
    for i in 0..20 {
        let child_html = format!(r#"<a href="/page{i}/deep">d</a>"#);
        fetcher = fetcher.with_page(
            &format!("https://example.test/page{i}"),
            &format!("Page {i}"),
            &words(120),
            &child_html,
        );
        fetcher = fetcher.with_page(
            &format!("https://example.test/page{i}/deep"),
            &format!("Deep {i}"),
            &words(120),
            "",
        );
    }

    let pipeline = pipeline_over(&store, fetcher, false);
    let fetcher_for_crawl = {
        // The crawler needs its own fetcher handle; rebuild the same map.
        let mut f = StaticFetcher::default();
        let mut seed_html = String::new();
        for i in 0..20 {
            seed_html.push_str(&format!(r#"<a href="/page{i}">p{i}</a>"#));
        }
        f = f.with_page("https://example.test/", "Seed", &words(120), &seed_html);
        for i in 0..20 {
            let child_html = format!(r#"<a href="/page{i}/deep">d</a>"#);
            f = f.with_page(
                &format!("https://example.test/page{i}"),
                &format!("Page {i}"),
                &words(120),
                &child_html,
            );
            f = f.with_page(
                &format!("https://example.test/page{i}/deep"),
                &format!("Deep {i}"),
                &words(120),
                "",
            );
        }
        Arc::new(f)
    };

    let crawler = DeepCrawler::new(Arc::clone(&pipeline), fetcher_for_crawl);
    let report = crawler
        .crawl(
            "https://example.test/",
            DeepCrawlOptions {
                max_depth: 2,
                max_pages: 10,
                timeout: Duration::from_secs(30),
                ..DeepCrawlOptions::default()
            },
        )
        .await
        .unwrap();

    assert!(report.stored.len() + report.failed.len() <= 10);
    assert!(report.stored.iter().any(|p| p.url == "https://example.test/"));
    assert!(report.stored.iter().all(|p| p.depth <= 2));
    assert!(store.doc_count() <= 10);
}

#[tokio::test]
async fn batch_driver_aggregates_per_url_outcomes() {
    let store = Arc::new(MemStore::default());
    let fetcher = StaticFetcher::default()
        .with_page("https://example.test/ok1", "A", &words(100), "")
        .with_page("https://example.test/ok2", "B", &words(100), "");
    let pipeline = pipeline_over(&store, fetcher, false);
    let driver = BatchDriver::new(pipeline);

    let urls = vec![
        "https://example.test/ok1".to_string(),
        "https://example.test/ok2".to_string(),
        "https://example.test/missing".to_string(),
    ];
    let report = driver.run(urls, BatchOptions::default()).await;

    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_urls, vec!["https://example.test/missing"]);
    assert_eq!(report.items.len(), 3);
    let missing = report
        .items
        .iter()
        .find(|i| i.url.ends_with("missing"))
        .unwrap();
    assert!(!missing.success);
    assert!(missing.error.as_deref().unwrap().contains("no route"));
    assert_eq!(store.doc_count(), 2);
}

#[tokio::test]
async fn batch_driver_enforces_per_url_timeout() {
    struct SlowFetcher;

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(FetchedPage {
                url: url.to_string(),
                title: "slow".to_string(),
                cleaned_html: String::new(),
                markdown: "too late".to_string(),
                status: 200,
            })
        }
    }

    let store = Arc::new(MemStore::default());
    let pipeline = Arc::new(IngestionPipeline::new(
        Arc::clone(&store) as Arc<dyn ContentStore>,
        Arc::new(SlowFetcher),
        Arc::new(HashEmbedder::new()),
        false,
    ));
    let driver = BatchDriver::new(pipeline);

    let options = BatchOptions {
        url_timeout: std::time::Duration::from_millis(50),
        ..BatchOptions::default()
    };
    let report = driver
        .run(vec!["https://example.test/slow".to_string()], options)
        .await;
    assert_eq!(report.failed, 1);
    assert!(report.items[0].error.as_deref().unwrap().contains("timed out"));
    assert_eq!(store.doc_count(), 0);
}

#[tokio::test]
async fn session_clear_removes_only_session_rows() {
    let store = Arc::new(MemStore::default());
    let fetcher = StaticFetcher::default()
        .with_page("https://example.test/perm", "P", &words(60), "")
        .with_page("https://example.test/temp", "T", &words(60), "");
    let pipeline = pipeline_over(&store, fetcher, false);
    pipeline
        .ingest("https://example.test/perm", IngestOptions::permanent(vec![]))
        .await
        .unwrap();
    pipeline
        .ingest(
            "https://example.test/temp",
            IngestOptions::session(vec![], "session-1".to_string()),
        )
        .await
        .unwrap();

    let removed = store.clear_session("session-1").await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.doc_count(), 1);
}
