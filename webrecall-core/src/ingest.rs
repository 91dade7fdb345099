//! The ingestion pipeline: validate → blocklist → fetch → clean → chunk →
//! filter → embed → store → KG enqueue.
//!
//! The pipeline is the only write path that creates content; admin
//! operations are limited to deletes. Nothing is written before the embed
//! step succeeds, so a failure anywhere leaves the store untouched.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::blocklist;
use crate::chunk;
use crate::clean;
use crate::embed::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::fetch::PageFetcher;
use crate::storage::ContentStore;
use crate::types::{IngestReport, KgStatus, RetentionPolicy, StoredDocument};
use crate::validate;

/// Per-ingestion options.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub retention: RetentionPolicy,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    /// Use the longer batch fetch deadline.
    pub batch_deadline: bool,
}

impl IngestOptions {
    pub fn permanent(tags: Vec<String>) -> Self {
        IngestOptions {
            retention: RetentionPolicy::Permanent,
            tags,
            session_id: None,
            batch_deadline: false,
        }
    }

    pub fn session(tags: Vec<String>, session_id: String) -> Self {
        IngestOptions {
            retention: RetentionPolicy::SessionOnly,
            tags,
            session_id: Some(session_id),
            batch_deadline: false,
        }
    }
}

/// Orchestrates one URL through the full store path.
pub struct IngestionPipeline {
    store: Arc<dyn ContentStore>,
    fetcher: Arc<dyn PageFetcher>,
    embedder: Arc<dyn EmbeddingProvider>,
    kg_enabled: bool,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn ContentStore>,
        fetcher: Arc<dyn PageFetcher>,
        embedder: Arc<dyn EmbeddingProvider>,
        kg_enabled: bool,
    ) -> Self {
        IngestionPipeline {
            store,
            fetcher,
            embedder,
            kg_enabled,
        }
    }

    /// Check the URL against every stored pattern.
    pub async fn blocklist_decision(&self, url: &str) -> Result<blocklist::BlockDecision> {
        let patterns = self.store.list_block_patterns().await?;
        Ok(blocklist::decide(
            patterns.iter().map(|p| (p.pattern.as_str(), p.description.as_str())),
            url,
        ))
    }

    /// Reject the URL if any stored pattern matches it.
    pub async fn check_blocklist(&self, url: &str) -> Result<()> {
        let decision = self.blocklist_decision(url).await?;
        if decision.blocked {
            return Err(Error::Blocked {
                pattern: decision.pattern.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Ingest one URL. On success the returned report carries the content
    /// id, stored chunk count, and any quality warnings; every failure is
    /// an `Err` and leaves the store unchanged.
    pub async fn ingest(&self, url: &str, opts: IngestOptions) -> Result<IngestReport> {
        let url = validate::url(url)?;
        if opts.retention == RetentionPolicy::SessionOnly && opts.session_id.is_none() {
            return Err(Error::validation(
                "session_id",
                "session_only retention requires a session",
            ));
        }
        self.check_blocklist(&url).await?;

        let page = if opts.batch_deadline {
            self.fetcher.fetch_for_batch(&url).await?
        } else {
            self.fetcher.fetch(&url).await?
        };

        self.store_fetched(&url, &page, opts).await
    }

    /// Clean, chunk, embed, and store an already-fetched page. The deep
    /// crawler fetches pages itself (it needs the HTML for link
    /// extraction) and enters the pipeline here.
    pub async fn store_fetched(
        &self,
        url: &str,
        page: &crate::types::FetchedPage,
        opts: IngestOptions,
    ) -> Result<IngestReport> {
        let url = url.to_string();
        let mut warnings = Vec::new();
        let report = clean::clean_markdown(&page.markdown, &url);
        if !report.is_clean {
            warn!(
                url = %url,
                reduction = report.reduction,
                nav_hits = report.nav_hits,
                "page cleaned aggressively"
            );
            warnings.push(format!(
                "content reduced by {:.0}% with {} navigation indicators",
                report.reduction * 100.0,
                report.nav_hits
            ));
        }

        let raw_chunks = chunk::split_default(&report.text);
        let outcome = chunk::filter(raw_chunks);
        if outcome.safety_floor_applied {
            warnings.push("all chunks failed quality filtering; kept leading chunks".to_string());
        }
        debug!(
            url = %url,
            kept = outcome.kept.len(),
            dropped = outcome.dropped.len(),
            "chunked page"
        );

        let texts: Vec<String> = outcome.kept.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != outcome.kept.len() {
            return Err(Error::Embed(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                outcome.kept.len()
            )));
        }

        let doc = StoredDocument {
            url: url.clone(),
            title: validate::title(&page.title),
            cleaned: report.text,
            retention: opts.retention,
            tags: opts.tags,
            metadata: serde_json::json!({
                "status": page.status,
                "reduction": report.reduction,
                "is_clean": report.is_clean,
            }),
            session_id: opts.session_id,
            chunks: outcome.kept,
            vectors,
        };
        let stored = self.store.store_document(doc).await?;

        let (status, reason) = if self.kg_enabled {
            (KgStatus::Pending, None)
        } else {
            (KgStatus::Skipped, Some("kg_service_unavailable"))
        };
        self.store
            .enqueue_kg(stored.content_id, status, reason)
            .await?;

        info!(
            url = %url,
            content_id = stored.content_id,
            chunks = stored.chunks_stored,
            replaced = stored.replaced,
            "ingested page"
        );

        Ok(IngestReport {
            success: true,
            url,
            content_id: Some(stored.content_id),
            chunks_stored: stored.chunks_stored,
            warnings,
            error: None,
        })
    }

    /// Ingest, folding failures into the report instead of an error. Used
    /// by the batch driver and deep crawler, which aggregate per-URL
    /// outcomes rather than failing the whole run.
    pub async fn ingest_report(&self, url: &str, opts: IngestOptions) -> IngestReport {
        match self.ingest(url, opts).await {
            Ok(report) => report,
            Err(err) => IngestReport::failure(url, err.to_string()),
        }
    }
}
