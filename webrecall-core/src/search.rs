//! Semantic search: vector KNN with tag filtering, URL dedup, and the
//! two-pass target-search variant.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::constants::{SEARCH_HARD_MAX, SEARCH_OVERFETCH_FACTOR};
use crate::embed::EmbeddingProvider;
use crate::error::Result;
use crate::storage::ContentStore;
use crate::types::{ChunkHit, SearchHit, TargetSearchResult};
use crate::validate;

/// Split a stored comma-tag string into a set.
fn tag_set(tags: &str) -> HashSet<String> {
    tags.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// ANY-match: the hit qualifies when its tags intersect the filter set.
fn tags_intersect(hit_tags: &str, filter: &[String]) -> bool {
    let hit_set = tag_set(hit_tags);
    filter.iter().any(|t| hit_set.contains(&t.to_lowercase()))
}

/// Collapse chunk hits to one hit per URL, keeping the best similarity.
fn dedup_by_url(hits: Vec<ChunkHit>) -> Vec<SearchHit> {
    let mut best: BTreeMap<String, ChunkHit> = BTreeMap::new();
    for hit in hits {
        match best.get(&hit.url) {
            Some(existing) if existing.similarity >= hit.similarity => {}
            _ => {
                best.insert(hit.url.clone(), hit);
            }
        }
    }
    let mut out: Vec<SearchHit> = best
        .into_values()
        .map(|hit| SearchHit {
            url: hit.url,
            title: hit.title,
            tags: hit.tags
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            snippet: hit.snippet,
            similarity: hit.similarity,
        })
        .collect();
    out.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then(a.url.cmp(&b.url)));
    out
}

/// Vector search over the stored chunks.
pub struct SearchEngine {
    store: Arc<dyn ContentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn ContentStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        SearchEngine { store, embedder }
    }

    /// Semantic search: embed the query, over-fetch chunk hits to survive
    /// URL dedup losses, filter by tags, dedup by URL, rank by similarity.
    pub async fn search(
        &self,
        query: &str,
        limit: u32,
        tags: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        let query = validate::query(query)?;
        let limit = validate::integer("limit", i64::from(limit), 1, 1000)? as u32;

        let query_vec = self.embedder.embed_one(&query).await?;
        let k = (limit.saturating_mul(SEARCH_OVERFETCH_FACTOR)).min(SEARCH_HARD_MAX);
        let mut hits = self.store.vector_search(&query_vec, k).await?;
        debug!(query = %query, raw_hits = hits.len(), k, "vector search");

        if let Some(filter) = tags.filter(|f| !f.is_empty()) {
            hits.retain(|hit| tags_intersect(&hit.tags, filter));
        }

        let mut deduped = dedup_by_url(hits);
        deduped.truncate(limit as usize);
        Ok(deduped)
    }

    /// Two-pass search: discover tags from an initial pass, then re-query
    /// with the tag filter expanded by the discovered set. Explicit
    /// `user_tags` are a floor; the expansion unions with them and never
    /// drops them.
    pub async fn target_search(
        &self,
        query: &str,
        initial_limit: u32,
        expanded_limit: u32,
        user_tags: Option<&[String]>,
    ) -> Result<TargetSearchResult> {
        let first_pass = self
            .search(query, initial_limit, user_tags)
            .await?;

        let discovered = discover_tags(&first_pass);
        if discovered.is_empty() {
            return Ok(TargetSearchResult {
                results: first_pass,
                discovered_tags: discovered,
                expansion_used: false,
            });
        }

        let mut expanded_filter: Vec<String> = user_tags.unwrap_or_default().to_vec();
        for tag in &discovered {
            if !expanded_filter.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                expanded_filter.push(tag.clone());
            }
        }

        let second_pass = self
            .search(query, expanded_limit, Some(&expanded_filter))
            .await?;

        // Merge both passes, dedup by URL keeping the best similarity.
        let mut merged: BTreeMap<String, SearchHit> = BTreeMap::new();
        for hit in first_pass.into_iter().chain(second_pass) {
            match merged.get(&hit.url) {
                Some(existing) if existing.similarity >= hit.similarity => {}
                _ => {
                    merged.insert(hit.url.clone(), hit);
                }
            }
        }
        let mut results: Vec<SearchHit> = merged.into_values().collect();
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then(a.url.cmp(&b.url)));
        results.truncate(expanded_limit as usize);

        Ok(TargetSearchResult {
            results,
            discovered_tags: discovered,
            expansion_used: true,
        })
    }
}

/// Union of tags across hits, ordered by frequency then lexically.
fn discover_tags(hits: &[SearchHit]) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for hit in hits {
        for tag in &hit.tags {
            let tag = tag.trim();
            if !tag.is_empty() {
                *counts.entry(tag.to_string()).or_default() += 1;
            }
        }
    }
    let mut tags: Vec<(String, usize)> = counts.into_iter().collect();
    tags.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    tags.into_iter().map(|(tag, _)| tag).collect()
}
