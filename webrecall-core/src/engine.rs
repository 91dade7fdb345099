//! Process-wide engine facade.
//!
//! One `RecallEngine` is constructed at startup and shared by every front
//! end (HTTP handlers, MCP dispatcher). It owns the pipeline, search
//! engine, crawl drivers, and the admin operations, and carries the
//! process session id used for `session_only` content.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::batch::{BatchDriver, BatchOptions, BatchReport};
use crate::clean;
use crate::config::RuntimeConfig;
use crate::crawler::{DeepCrawlOptions, DeepCrawlReport, DeepCrawler};
use crate::embed::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::fetch::PageFetcher;
use crate::ingest::{IngestOptions, IngestionPipeline};
use crate::search::SearchEngine;
use crate::storage::ContentStore;
use crate::types::{
    BlockPattern, ContentSummary, DomainCount, IngestReport, RetentionPolicy, SearchHit,
    StoreStats, TargetSearchResult,
};
use crate::validate;

/// Preview of a fetched page, returned by `crawl_url` (no store).
#[derive(Debug, Clone, serde::Serialize)]
pub struct CrawlPreview {
    pub url: String,
    pub title: String,
    pub markdown: String,
    pub word_count: usize,
    pub is_clean: bool,
    pub reduction: f32,
}

/// The shared engine behind every front end.
pub struct RecallEngine {
    store: Arc<dyn ContentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    fetcher: Arc<dyn PageFetcher>,
    pipeline: Arc<IngestionPipeline>,
    search: SearchEngine,
    crawler: DeepCrawler,
    batch: BatchDriver,
    session_id: String,
    block_removal_token: Option<String>,
    crawler_url: String,
    memory_mode: bool,
}

impl RecallEngine {
    /// Wire the engine from its collaborators. Registers the process
    /// session with the store.
    pub async fn new(
        store: Arc<dyn ContentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        fetcher: Arc<dyn PageFetcher>,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        let session_id = Uuid::new_v4().to_string();
        store.register_session(&session_id).await?;
        info!(session_id = %session_id, "engine session registered");

        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&store),
            Arc::clone(&fetcher),
            Arc::clone(&embedder),
            config.kg_service_url.is_some(),
        ));
        let search = SearchEngine::new(Arc::clone(&store), Arc::clone(&embedder));
        let crawler = DeepCrawler::new(Arc::clone(&pipeline), Arc::clone(&fetcher));
        let batch = BatchDriver::new(Arc::clone(&pipeline));

        Ok(RecallEngine {
            store,
            embedder,
            fetcher,
            pipeline,
            search,
            crawler,
            batch,
            session_id,
            block_removal_token: config.block_removal_token.clone(),
            crawler_url: config.crawler_url.clone(),
            memory_mode: config.use_memory_db,
        })
    }

    /// The immutable process session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Fetch and clean a page without storing anything.
    pub async fn crawl_preview(&self, url: &str) -> Result<CrawlPreview> {
        let url = validate::url(url)?;
        self.pipeline.check_blocklist(&url).await?;
        let page = self.fetcher.fetch(&url).await?;
        let report = clean::clean_markdown(&page.markdown, &url);
        Ok(CrawlPreview {
            url,
            title: page.title,
            word_count: report.text.split_whitespace().count(),
            is_clean: report.is_clean,
            reduction: report.reduction,
            markdown: report.text,
        })
    }

    /// Fetch and store permanently (or with the given retention).
    pub async fn crawl_and_remember(
        &self,
        url: &str,
        tags: Vec<String>,
        retention: RetentionPolicy,
    ) -> Result<IngestReport> {
        let opts = match retention {
            RetentionPolicy::SessionOnly => {
                IngestOptions::session(tags, self.session_id.clone())
            }
            other => IngestOptions {
                retention: other,
                tags,
                session_id: None,
                batch_deadline: false,
            },
        };
        self.pipeline.ingest(url, opts).await
    }

    /// Fetch and store scoped to this process session.
    pub async fn crawl_temp(&self, url: &str, tags: Vec<String>) -> Result<IngestReport> {
        self.crawl_and_remember(url, tags, RetentionPolicy::SessionOnly)
            .await
    }

    /// Deep crawl; session-scoped options are filled in for session
    /// retention.
    pub async fn deep_crawl(
        &self,
        seed: &str,
        mut options: DeepCrawlOptions,
    ) -> Result<DeepCrawlReport> {
        if options.retention == RetentionPolicy::SessionOnly {
            options.session_id = Some(self.session_id.clone());
        }
        self.crawler.crawl(seed, options).await
    }

    /// Batch recrawl over an explicit URL list.
    pub async fn batch_crawl(
        &self,
        urls: Vec<String>,
        mut options: BatchOptions,
    ) -> Result<BatchReport> {
        if options.retention == RetentionPolicy::SessionOnly {
            options.session_id = Some(self.session_id.clone());
        }
        Ok(self.batch.run(urls, options).await)
    }

    /// Batch recrawl from a URL file; failures land in a `.failed` sidecar.
    pub async fn batch_crawl_file(
        &self,
        path: &std::path::Path,
        mut options: BatchOptions,
    ) -> Result<BatchReport> {
        if options.retention == RetentionPolicy::SessionOnly {
            options.session_id = Some(self.session_id.clone());
        }
        self.batch.run_file(path, options).await
    }

    /// Semantic search.
    pub async fn search(
        &self,
        query: &str,
        limit: u32,
        tags: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        self.search.search(query, limit, tags).await
    }

    /// Two-pass target search.
    pub async fn target_search(
        &self,
        query: &str,
        initial_limit: u32,
        expanded_limit: u32,
        tags: Option<&[String]>,
    ) -> Result<TargetSearchResult> {
        self.search
            .target_search(query, initial_limit, expanded_limit, tags)
            .await
    }

    /// List stored content.
    pub async fn list_memory(
        &self,
        filter: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ContentSummary>> {
        let limit = validate::integer("limit", i64::from(limit), 1, 1000)? as u32;
        if let Some(f) = filter {
            RetentionPolicy::parse(f)?;
        }
        self.store.list_content(filter, limit, offset).await
    }

    /// Remove one URL. Errors with `NotFound` when nothing was stored.
    pub async fn forget_url(&self, url: &str) -> Result<u64> {
        let url = validate::url(url)?;
        let removed = self.store.forget_url(&url).await?;
        if removed == 0 {
            return Err(Error::NotFound(format!("no content stored for {url}")));
        }
        info!(url = %url, removed, "forgot url");
        Ok(removed)
    }

    /// Remove every session-scoped row for this process.
    pub async fn clear_temp_memory(&self) -> Result<u64> {
        let removed = self.store.clear_session(&self.session_id).await?;
        info!(session_id = %self.session_id, removed, "cleared session memory");
        Ok(removed)
    }

    /// Aggregate stats plus sync health.
    pub async fn database_stats(&self) -> Result<serde_json::Value> {
        let stats: StoreStats = self.store.stats().await?;
        let sync = self.store.sync_metrics().await?;
        Ok(json!({
            "storage": stats,
            "sync": sync,
            "memory_mode": self.memory_mode,
            "session_id": self.session_id,
        }))
    }

    /// Page counts per domain.
    pub async fn list_domains(&self) -> Result<Vec<DomainCount>> {
        self.store.domain_counts().await
    }

    /// Component health for the status endpoint.
    pub async fn status(&self) -> serde_json::Value {
        let storage_ok = self.store.stats().await.is_ok();
        json!({
            "storage": if storage_ok { "healthy" } else { "unavailable" },
            "memory_mode": self.memory_mode,
            "crawler_url": self.crawler_url,
            "embedder": {
                "model": self.embedder.model_name(),
                "dimension": self.embedder.dimension(),
            },
            "session_id": self.session_id,
        })
    }

    // Blocklist admin ------------------------------------------------------

    pub async fn list_blocked_domains(&self) -> Result<Vec<BlockPattern>> {
        self.store.list_block_patterns().await
    }

    pub async fn block_domain(&self, pattern: &str, description: &str) -> Result<BlockPattern> {
        let pattern = validate::block_pattern(pattern)?;
        let description = validate::description(description)?;
        self.store.add_block_pattern(&pattern, &description).await?;
        info!(pattern = %pattern, "blocked domain pattern");
        Ok(BlockPattern {
            pattern,
            description,
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Remove a block pattern; requires the out-of-band removal token.
    pub async fn unblock_domain(&self, pattern: &str, auth_token: &str) -> Result<bool> {
        let expected = self
            .block_removal_token
            .as_deref()
            .ok_or_else(|| Error::Auth("block removal is not configured".to_string()))?;
        if auth_token != expected {
            return Err(Error::Auth("invalid block removal token".to_string()));
        }
        let pattern = validate::block_pattern(pattern)?;
        let removed = self.store.remove_block_pattern(&pattern).await?;
        if !removed {
            return Err(Error::NotFound(format!("pattern '{pattern}' is not blocked")));
        }
        info!(pattern = %pattern, "unblocked domain pattern");
        Ok(true)
    }
}
