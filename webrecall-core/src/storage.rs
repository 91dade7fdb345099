//! Storage backend abstraction the engine programs against.
//!
//! The concrete implementation lives in `webrecall-storage-sqlite`; core
//! components only see this trait, which keeps the pipeline and search
//! engine testable against lightweight fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    BlockPattern, ChunkHit, ContentSummary, DomainCount, KgStatus, StoreOutcome, StoreStats,
    StoredDocument,
};

/// Sync health surfaced through the stats endpoints. Backends without a
/// RAM mirror report `None` from [`ContentStore::sync_metrics`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncMetricsSnapshot {
    pub total_syncs: u64,
    pub failed_syncs: u64,
    pub records_synced: u64,
    pub pending_changes: u64,
    pub last_sync_at: Option<i64>,
    pub last_sync_ms: Option<u64>,
    pub success_rate: f32,
}

/// The narrow API every storage backend offers the rest of the system.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Transactionally upsert one document by URL: replace the content row,
    /// delete any prior chunks and vectors, and insert the new set.
    /// Readers never observe a partial replacement.
    async fn store_document(&self, doc: StoredDocument) -> Result<StoreOutcome>;

    /// Remove a URL and its chunks/vectors. Returns removed content rows.
    async fn forget_url(&self, url: &str) -> Result<u64>;

    /// Remove every `session_only` row belonging to `session_id`.
    async fn clear_session(&self, session_id: &str) -> Result<u64>;

    /// List stored content, newest first. `filter` matches the retention
    /// token exactly when present.
    async fn list_content(
        &self,
        filter: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ContentSummary>>;

    /// K-nearest-neighbour chunk hits for a query vector, joined to their
    /// live content rows. Hits whose content disappeared concurrently are
    /// dropped by the join.
    async fn vector_search(&self, query: &[f32], k: u32) -> Result<Vec<ChunkHit>>;

    /// Register the process session.
    async fn register_session(&self, session_id: &str) -> Result<()>;

    /// Aggregate row counts and sizes.
    async fn stats(&self) -> Result<StoreStats>;

    /// Page counts per domain.
    async fn domain_counts(&self) -> Result<Vec<DomainCount>>;

    /// Enqueue a knowledge-graph processing row for freshly stored content.
    async fn enqueue_kg(
        &self,
        content_id: i64,
        status: KgStatus,
        skipped_reason: Option<&str>,
    ) -> Result<()>;

    /// Delete time-bounded rows older than their retention window.
    /// Returns removed content rows.
    async fn sweep_expired(&self, now_epoch: i64) -> Result<u64>;

    // Blocklist store ------------------------------------------------------

    /// All block patterns, oldest first.
    async fn list_block_patterns(&self) -> Result<Vec<BlockPattern>>;

    /// Add a pattern; duplicate patterns are rejected.
    async fn add_block_pattern(&self, pattern: &str, description: &str) -> Result<()>;

    /// Remove a pattern. Returns true when a row was deleted.
    async fn remove_block_pattern(&self, pattern: &str) -> Result<bool>;

    // Sync health ----------------------------------------------------------

    /// Differential-sync metrics, when the backend runs a RAM mirror.
    async fn sync_metrics(&self) -> Result<Option<SyncMetricsSnapshot>>;
}
