//! Common types shared by the pipeline, search engine, and storage backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How long ingested content is retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RetentionPolicy {
    /// Kept until explicitly forgotten.
    Permanent,
    /// Scoped to the current process session; swept by `clear_session`.
    SessionOnly,
    /// Kept for the given number of days, then swept.
    Days(u32),
}

impl RetentionPolicy {
    /// Parse a retention token. Only `permanent`, `session_only`, and
    /// `30_days` are accepted from callers.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "permanent" => Ok(RetentionPolicy::Permanent),
            "session_only" => Ok(RetentionPolicy::SessionOnly),
            "30_days" => Ok(RetentionPolicy::Days(30)),
            other => Err(Error::validation(
                "retention_policy",
                format!("unknown retention '{other}'"),
            )),
        }
    }

    /// Stored string form (`permanent`, `session_only`, `N_days`).
    pub fn as_token(&self) -> String {
        match self {
            RetentionPolicy::Permanent => "permanent".to_string(),
            RetentionPolicy::SessionOnly => "session_only".to_string(),
            RetentionPolicy::Days(n) => format!("{n}_days"),
        }
    }

    /// Decode the stored string form, accepting any `N_days` value.
    pub fn from_stored(token: &str) -> Self {
        match token {
            "permanent" => RetentionPolicy::Permanent,
            "session_only" => RetentionPolicy::SessionOnly,
            other => other
                .strip_suffix("_days")
                .and_then(|n| n.parse::<u32>().ok())
                .map_or(RetentionPolicy::Permanent, RetentionPolicy::Days),
        }
    }
}

impl TryFrom<String> for RetentionPolicy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        RetentionPolicy::parse(&value)
    }
}

impl From<RetentionPolicy> for String {
    fn from(value: RetentionPolicy) -> Self {
        value.as_token()
    }
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_token())
    }
}

/// One word-windowed slice of cleaned text with exact character offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub word_count: usize,
}

/// Everything the storage engine needs to persist one crawled page
/// atomically: the content row plus its chunk/vector set.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub url: String,
    pub title: String,
    pub cleaned: String,
    pub retention: RetentionPolicy,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
    pub session_id: Option<String>,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
}

/// Outcome of a transactional document store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome {
    pub content_id: i64,
    pub replaced: bool,
    pub chunks_stored: usize,
}

/// One content row as listed by `list_content`.
#[derive(Debug, Clone, Serialize)]
pub struct ContentSummary {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub retention: String,
    pub tags: String,
    pub timestamp: i64,
    pub preview: String,
}

/// One raw vector hit before URL dedup: a chunk joined to its content row.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub chunk_id: i64,
    pub content_id: i64,
    pub url: String,
    pub title: String,
    pub tags: String,
    pub snippet: String,
    pub similarity: f32,
}

/// A deduplicated search result, one per URL.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub tags: Vec<String>,
    pub snippet: String,
    pub similarity: f32,
}

/// Result of the two-pass target search.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSearchResult {
    pub results: Vec<SearchHit>,
    pub discovered_tags: Vec<String>,
    pub expansion_used: bool,
}

/// KG queue status written at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KgStatus {
    Pending,
    Skipped,
}

impl KgStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            KgStatus::Pending => "pending",
            KgStatus::Skipped => "skipped",
        }
    }
}

/// Per-retention row counts reported by `stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionBreakdown {
    pub permanent: u64,
    pub session_only: u64,
    pub time_bounded: u64,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub content_rows: u64,
    pub chunk_rows: u64,
    pub vector_rows: u64,
    pub session_rows: u64,
    pub blocked_patterns: u64,
    pub kg_queue_rows: u64,
    pub retention: RetentionBreakdown,
    pub db_file_bytes: u64,
}

/// Page count per domain, for `list_domains`.
#[derive(Debug, Clone, Serialize)]
pub struct DomainCount {
    pub domain: String,
    pub pages: u64,
}

/// A persisted block pattern.
#[derive(Debug, Clone, Serialize)]
pub struct BlockPattern {
    pub pattern: String,
    pub description: String,
    pub created_at: i64,
}

/// Report returned by one URL ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub success: bool,
    pub url: String,
    pub content_id: Option<i64>,
    pub chunks_stored: usize,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl IngestReport {
    pub fn failure(url: impl Into<String>, error: impl Into<String>) -> Self {
        IngestReport {
            success: false,
            url: url.into(),
            content_id: None,
            chunks_stored: 0,
            warnings: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Fetched page before any storage decision.
#[derive(Debug, Clone, Serialize)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub cleaned_html: String,
    pub markdown: String,
    pub status: u16,
}

/// Timestamp helper used in every user-facing envelope.
pub fn now_rfc3339() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_round_trip() {
        for token in ["permanent", "session_only", "30_days"] {
            let policy = RetentionPolicy::parse(token).unwrap();
            assert_eq!(policy.as_token(), token);
        }
        assert!(RetentionPolicy::parse("7_days").is_err());
    }

    #[test]
    fn stored_retention_accepts_any_day_count() {
        assert_eq!(RetentionPolicy::from_stored("7_days"), RetentionPolicy::Days(7));
        assert_eq!(
            RetentionPolicy::from_stored("session_only"),
            RetentionPolicy::SessionOnly
        );
        // Unparseable tokens degrade to permanent rather than deleting data.
        assert_eq!(
            RetentionPolicy::from_stored("garbage"),
            RetentionPolicy::Permanent
        );
    }
}
