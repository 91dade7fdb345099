//! `ContentStore` implementation: transactional upsert-by-URL, explicit
//! vector tracking, KNN search, retention sweeping, and the blocklist and
//! KG-queue stores.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Transaction};
use tracing::{debug, info};

use webrecall_core::blocklist::host_of;
use webrecall_core::embed::similarity_from_l2;
use webrecall_core::error::{Error, Result};
use webrecall_core::retry::{with_backoff, RetryConfig};
use webrecall_core::storage::{ContentStore, SyncMetricsSnapshot};
use webrecall_core::types::{
    BlockPattern, ChunkHit, ContentSummary, DomainCount, KgStatus, RetentionBreakdown,
    RetentionPolicy, StoreOutcome, StoreStats, StoredDocument,
};

use crate::{db_err, vector_to_blob, SqliteStorage};

/// Record an explicit tracker entry for a vector-table operation. The vec0
/// virtual table cannot carry triggers, so every code path that touches it
/// goes through here while change tracking is on.
fn track_vector_change(tx: &Transaction<'_>, rowid: i64, op: &str) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT OR REPLACE INTO sync_tracker(table_name, record_id, operation, changed_at)
         VALUES ('content_vectors', CAST(?1 AS TEXT), ?2, strftime('%s', 'now'))",
        params![rowid, op],
    )?;
    Ok(())
}

/// Delete a content row's chunks and vectors but keep the row itself, for
/// upsert replacement. Returns the number of chunks removed.
fn delete_chunks_only(tx: &Transaction<'_>, content_id: i64, track: bool) -> rusqlite::Result<usize> {
    let chunk_ids: Vec<i64> = tx
        .prepare("SELECT id FROM content_chunks WHERE content_id = ?1")?
        .query_map(params![content_id], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    for chunk_id in &chunk_ids {
        tx.execute(
            "DELETE FROM content_vectors WHERE rowid = ?1",
            params![chunk_id],
        )?;
        if track {
            track_vector_change(tx, *chunk_id, "DELETE")?;
        }
    }
    tx.execute(
        "DELETE FROM content_chunks WHERE content_id = ?1",
        params![content_id],
    )?;
    Ok(chunk_ids.len())
}

/// Delete one content row with its chunks, vectors, and queue rows inside
/// the caller's transaction. Returns the number of chunks removed.
pub(crate) fn delete_content_tx(
    tx: &Transaction<'_>,
    content_id: i64,
    track: bool,
) -> rusqlite::Result<usize> {
    let chunks = delete_chunks_only(tx, content_id, track)?;
    tx.execute(
        "DELETE FROM kg_processing_queue WHERE content_id = ?1",
        params![content_id],
    )?;
    tx.execute(
        "DELETE FROM crawled_content WHERE id = ?1",
        params![content_id],
    )?;
    Ok(chunks)
}

/// Delete expired time-bounded rows. Shared by the public sweep API and the
/// periodic sync tick.
pub(crate) fn sweep_expired_tx(
    tx: &Transaction<'_>,
    now_epoch: i64,
    track: bool,
) -> rusqlite::Result<u64> {
    let candidates: Vec<(i64, String, i64)> = tx
        .prepare(
            "SELECT id, retention, timestamp FROM crawled_content
             WHERE retention NOT IN ('permanent', 'session_only')",
        )?
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<rusqlite::Result<_>>()?;

    let mut removed = 0u64;
    for (id, retention, timestamp) in candidates {
        if let RetentionPolicy::Days(days) = RetentionPolicy::from_stored(&retention) {
            let age = now_epoch - timestamp;
            if age > i64::from(days) * 86_400 {
                delete_content_tx(tx, id, track)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

impl SqliteStorage {
    async fn write_call<T, F>(&self, label: &str, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&mut rusqlite::Connection) -> std::result::Result<T, tokio_rusqlite::Error>
            + Clone
            + Send
            + 'static,
    {
        let retry = RetryConfig::default();
        let result = with_backoff(&retry, label, || {
            let conn = self.connection().clone();
            let operation = operation.clone();
            async move { conn.call(operation).await.map_err(db_err) }
        })
        .await?;
        if self.tracking() {
            self.clock().touch();
        }
        Ok(result)
    }
}

#[async_trait]
impl ContentStore for SqliteStorage {
    async fn store_document(&self, doc: StoredDocument) -> Result<StoreOutcome> {
        if doc.chunks.len() != doc.vectors.len() {
            return Err(Error::Storage(format!(
                "chunk/vector mismatch: {} chunks, {} vectors",
                doc.chunks.len(),
                doc.vectors.len()
            )));
        }
        let track = self.tracking();

        let outcome = self
            .write_call("store_document", move |conn| {
                let doc = doc.clone();
                let tx = conn.transaction()?;
                let now = chrono::Utc::now().timestamp();

                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM crawled_content WHERE url = ?1",
                        params![doc.url],
                        |row| row.get(0),
                    )
                    .optional()?;
                let replaced = existing.is_some();

                let content_id = if let Some(id) = existing {
                    // Replace-in-place: old chunks and vectors go first so
                    // readers never see mixed generations.
                    delete_chunks_only(&tx, id, track)?;
                    tx.execute(
                        "UPDATE crawled_content
                         SET title = ?1, content = ?2, markdown = ?3, timestamp = ?4,
                             retention = ?5, session_id = ?6, tags = ?7, metadata = ?8
                         WHERE id = ?9",
                        params![
                            doc.title,
                            doc.cleaned,
                            doc.cleaned,
                            now,
                            doc.retention.as_token(),
                            doc.session_id,
                            doc.tags.join(","),
                            doc.metadata.to_string(),
                            id
                        ],
                    )?;
                    id
                } else {
                    tx.execute(
                        "INSERT INTO crawled_content
                         (url, title, content, markdown, timestamp, retention, session_id, tags, metadata)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            doc.url,
                            doc.title,
                            doc.cleaned,
                            doc.cleaned,
                            now,
                            doc.retention.as_token(),
                            doc.session_id,
                            doc.tags.join(","),
                            doc.metadata.to_string()
                        ],
                    )?;
                    tx.last_insert_rowid()
                };

                for (chunk, vector) in doc.chunks.iter().zip(&doc.vectors) {
                    tx.execute(
                        "INSERT INTO content_chunks
                         (content_id, chunk_index, text, char_start, char_end, word_count, kg_processed)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                        params![
                            content_id,
                            chunk.index as i64,
                            chunk.text,
                            chunk.char_start as i64,
                            chunk.char_end as i64,
                            chunk.word_count as i64
                        ],
                    )?;
                    let rowid = tx.last_insert_rowid();
                    tx.execute(
                        "INSERT INTO content_vectors(rowid, embedding) VALUES (?1, ?2)",
                        params![rowid, vector_to_blob(vector)],
                    )?;
                    if track {
                        track_vector_change(&tx, rowid, "INSERT")?;
                    }
                }

                let chunks_stored = doc.chunks.len();
                tx.commit()?;
                Ok(StoreOutcome {
                    content_id,
                    replaced,
                    chunks_stored,
                })
            })
            .await?;

        debug!(
            content_id = outcome.content_id,
            replaced = outcome.replaced,
            chunks = outcome.chunks_stored,
            "stored document"
        );
        Ok(outcome)
    }

    async fn forget_url(&self, url: &str) -> Result<u64> {
        let track = self.tracking();
        let url = url.to_string();
        self.write_call("forget_url", move |conn| {
            let url = url.clone();
            let tx = conn.transaction()?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM crawled_content WHERE url = ?1",
                    params![url],
                    |row| row.get(0),
                )
                .optional()?;
            let removed = match existing {
                Some(id) => {
                    delete_content_tx(&tx, id, track)?;
                    1
                }
                None => 0,
            };
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn clear_session(&self, session_id: &str) -> Result<u64> {
        let track = self.tracking();
        let session_id = session_id.to_string();
        let removed = self
            .write_call("clear_session", move |conn| {
                let session_id = session_id.clone();
                let tx = conn.transaction()?;
                let ids: Vec<i64> = tx
                    .prepare(
                        "SELECT id FROM crawled_content
                         WHERE retention = 'session_only' AND session_id = ?1",
                    )?
                    .query_map(params![session_id], |row| row.get(0))?
                    .collect::<rusqlite::Result<_>>()?;
                for id in &ids {
                    delete_content_tx(&tx, *id, track)?;
                }
                tx.commit()?;
                Ok(ids.len() as u64)
            })
            .await?;
        info!(removed, "cleared session rows");
        Ok(removed)
    }

    async fn list_content(
        &self,
        filter: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ContentSummary>> {
        let filter = filter.map(str::to_string);
        self.connection()
            .call(move |conn| {
                let mut sql = String::from(
                    "SELECT id, url, title, retention, tags, timestamp, substr(content, 1, 200)
                     FROM crawled_content",
                );
                if filter.is_some() {
                    sql.push_str(" WHERE retention = ?1 ORDER BY timestamp DESC LIMIT ?2 OFFSET ?3");
                } else {
                    sql.push_str(" ORDER BY timestamp DESC LIMIT ?1 OFFSET ?2");
                }

                let map_row = |row: &rusqlite::Row<'_>| {
                    Ok(ContentSummary {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        title: row.get(2)?,
                        retention: row.get(3)?,
                        tags: row.get(4)?,
                        timestamp: row.get(5)?,
                        preview: row.get(6)?,
                    })
                };

                let mut stmt = conn.prepare(&sql)?;
                let rows = match &filter {
                    Some(f) => stmt
                        .query_map(params![f, limit, offset], map_row)?
                        .collect::<rusqlite::Result<Vec<_>>>()?,
                    None => stmt
                        .query_map(params![limit, offset], map_row)?
                        .collect::<rusqlite::Result<Vec<_>>>()?,
                };
                Ok(rows)
            })
            .await
            .map_err(db_err)
    }

    async fn vector_search(&self, query: &[f32], k: u32) -> Result<Vec<ChunkHit>> {
        let blob = vector_to_blob(query);
        self.connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT v.rowid, v.distance, ch.content_id, c.url, c.title, c.tags,
                            substr(ch.text, 1, 300)
                     FROM (SELECT rowid, distance FROM content_vectors
                           WHERE embedding MATCH ?1
                           ORDER BY distance
                           LIMIT ?2) v
                     JOIN content_chunks ch ON ch.id = v.rowid
                     JOIN crawled_content c ON c.id = ch.content_id
                     ORDER BY v.distance ASC",
                )?;
                let hits = stmt
                    .query_map(params![blob, k], |row| {
                        let distance: f64 = row.get(1)?;
                        Ok(ChunkHit {
                            chunk_id: row.get(0)?,
                            content_id: row.get(2)?,
                            url: row.get(3)?,
                            title: row.get(4)?,
                            tags: row.get(5)?,
                            snippet: row.get(6)?,
                            similarity: similarity_from_l2(distance as f32),
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(hits)
            })
            .await
            .map_err(db_err)
    }

    async fn register_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.write_call("register_session", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO sessions(session_id, created_at) VALUES (?1, ?2)",
                params![session_id.clone(), chrono::Utc::now().timestamp()],
            )?;
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mut stats = self
            .connection()
            .call(|conn| {
                let count = |conn: &rusqlite::Connection, sql: &str| -> rusqlite::Result<u64> {
                    conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                        .map(|n| n as u64)
                };
                let mut retention = RetentionBreakdown::default();
                let mut stmt =
                    conn.prepare("SELECT retention, COUNT(*) FROM crawled_content GROUP BY retention")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                for (token, n) in rows {
                    match RetentionPolicy::from_stored(&token) {
                        RetentionPolicy::Permanent => retention.permanent += n as u64,
                        RetentionPolicy::SessionOnly => retention.session_only += n as u64,
                        RetentionPolicy::Days(_) => retention.time_bounded += n as u64,
                    }
                }
                Ok(StoreStats {
                    content_rows: count(conn, "SELECT COUNT(*) FROM crawled_content")?,
                    chunk_rows: count(conn, "SELECT COUNT(*) FROM content_chunks")?,
                    vector_rows: count(conn, "SELECT COUNT(*) FROM content_vectors")?,
                    session_rows: count(conn, "SELECT COUNT(*) FROM sessions")?,
                    blocked_patterns: count(conn, "SELECT COUNT(*) FROM blocked_domains")?,
                    kg_queue_rows: count(conn, "SELECT COUNT(*) FROM kg_processing_queue")?,
                    retention,
                    db_file_bytes: 0,
                })
            })
            .await
            .map_err(db_err)?;
        stats.db_file_bytes = std::fs::metadata(self.disk_path())
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(stats)
    }

    async fn domain_counts(&self) -> Result<Vec<DomainCount>> {
        let urls: Vec<String> = self
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT url FROM crawled_content")?;
                let urls = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(urls)
            })
            .await
            .map_err(db_err)?;

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for url in urls {
            *counts.entry(host_of(&url)).or_default() += 1;
        }
        let mut out: Vec<DomainCount> = counts
            .into_iter()
            .map(|(domain, pages)| DomainCount { domain, pages })
            .collect();
        out.sort_by(|a, b| b.pages.cmp(&a.pages).then(a.domain.cmp(&b.domain)));
        Ok(out)
    }

    async fn enqueue_kg(
        &self,
        content_id: i64,
        status: KgStatus,
        skipped_reason: Option<&str>,
    ) -> Result<()> {
        let reason = skipped_reason.map(str::to_string);
        self.write_call("enqueue_kg", move |conn| {
            let now = chrono::Utc::now().timestamp();
            conn.execute(
                "INSERT INTO kg_processing_queue
                 (content_id, status, retry_count, created_at, updated_at, skipped_reason)
                 VALUES (?1, ?2, 0, ?3, ?3, ?4)",
                params![content_id, status.as_str(), now, reason.clone()],
            )?;
            Ok(())
        })
        .await
    }

    async fn sweep_expired(&self, now_epoch: i64) -> Result<u64> {
        let track = self.tracking();
        let removed = self
            .write_call("sweep_expired", move |conn| {
                let tx = conn.transaction()?;
                let removed = sweep_expired_tx(&tx, now_epoch, track)?;
                tx.commit()?;
                Ok(removed)
            })
            .await?;
        if removed > 0 {
            info!(removed, "swept expired content");
        }
        Ok(removed)
    }

    async fn list_block_patterns(&self) -> Result<Vec<BlockPattern>> {
        self.connection()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT pattern, description, created_at FROM blocked_domains
                     ORDER BY created_at, pattern",
                )?;
                let patterns = stmt
                    .query_map([], |row| {
                        Ok(BlockPattern {
                            pattern: row.get(0)?,
                            description: row.get(1)?,
                            created_at: row.get(2)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(patterns)
            })
            .await
            .map_err(db_err)
    }

    async fn add_block_pattern(&self, pattern: &str, description: &str) -> Result<()> {
        let pattern_owned = pattern.to_string();
        let description = description.to_string();
        let inserted = self
            .write_call("add_block_pattern", move |conn| {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO blocked_domains(pattern, description, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![
                        pattern_owned.clone(),
                        description.clone(),
                        chrono::Utc::now().timestamp()
                    ],
                )?;
                Ok(inserted > 0)
            })
            .await?;
        if !inserted {
            return Err(Error::validation(
                "pattern",
                format!("'{pattern}' is already blocked"),
            ));
        }
        Ok(())
    }

    async fn remove_block_pattern(&self, pattern: &str) -> Result<bool> {
        let pattern = pattern.to_string();
        self.write_call("remove_block_pattern", move |conn| {
            let removed = conn.execute(
                "DELETE FROM blocked_domains WHERE pattern = ?1",
                params![pattern.clone()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn sync_metrics(&self) -> Result<Option<SyncMetricsSnapshot>> {
        match self.sync_manager() {
            Some(sync) => {
                let mut snapshot = sync.metrics_snapshot();
                snapshot.pending_changes = sync.pending_changes().await?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }
}
