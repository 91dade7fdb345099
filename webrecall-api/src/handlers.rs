//! Route handlers. Every handler extracts a small request struct, calls one
//! engine operation, and answers with the standard envelope.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use webrecall_core::crawler::DeepCrawlOptions;
use webrecall_core::error::Error;
use webrecall_core::types::{now_rfc3339, RetentionPolicy};
use webrecall_core::validate;
use webrecall_mcp::tools;

use crate::error::ApiError;
use crate::AppState;

type ApiResult = Result<Json<Value>, ApiError>;

fn envelope(data: Value) -> Json<Value> {
    Json(json!({"success": true, "data": data, "timestamp": now_rfc3339()}))
}

fn parse_tags(raw: Option<&str>) -> Result<Vec<String>, Error> {
    raw.map_or_else(|| Ok(Vec::new()), validate::tags)
}

fn parse_retention(raw: Option<&str>) -> Result<RetentionPolicy, Error> {
    raw.map_or(Ok(RetentionPolicy::Permanent), validate::retention)
}

// ---------------------------------------------------------------------------
// Public routes

pub async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "timestamp": now_rfc3339()}))
}

// ---------------------------------------------------------------------------
// Status and help

pub async fn status(State(state): State<AppState>) -> ApiResult {
    Ok(envelope(state.engine.status().await))
}

pub async fn help() -> ApiResult {
    Ok(envelope(json!({"tools": tools::catalog()})))
}

// ---------------------------------------------------------------------------
// Crawl routes

#[derive(Debug, Deserialize)]
pub struct CrawlBody {
    url: String,
}

pub async fn crawl(State(state): State<AppState>, Json(body): Json<CrawlBody>) -> ApiResult {
    let preview = state.engine.crawl_preview(&body.url).await?;
    Ok(envelope(serde_json::to_value(preview).map_err(Error::from)?))
}

#[derive(Debug, Deserialize)]
pub struct CrawlStoreBody {
    url: String,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    retention_policy: Option<String>,
}

pub async fn crawl_store(
    State(state): State<AppState>,
    Json(body): Json<CrawlStoreBody>,
) -> ApiResult {
    let tags = parse_tags(body.tags.as_deref())?;
    let retention = parse_retention(body.retention_policy.as_deref())?;
    let report = state.engine.crawl_and_remember(&body.url, tags, retention).await?;
    Ok(envelope(serde_json::to_value(report).map_err(Error::from)?))
}

pub async fn crawl_temp(
    State(state): State<AppState>,
    Json(body): Json<CrawlStoreBody>,
) -> ApiResult {
    let tags = parse_tags(body.tags.as_deref())?;
    let report = state.engine.crawl_temp(&body.url, tags).await?;
    Ok(envelope(serde_json::to_value(report).map_err(Error::from)?))
}

#[derive(Debug, Deserialize)]
pub struct DeepCrawlBody {
    url: String,
    #[serde(default)]
    max_depth: Option<u32>,
    #[serde(default)]
    max_pages: Option<u32>,
    #[serde(default)]
    include_external: Option<bool>,
    #[serde(default)]
    score_threshold: Option<f32>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    retention_policy: Option<String>,
}

fn deep_options(body: &DeepCrawlBody, store: bool) -> Result<DeepCrawlOptions, Error> {
    let defaults = DeepCrawlOptions::default();
    Ok(DeepCrawlOptions {
        max_depth: body.max_depth.unwrap_or(defaults.max_depth),
        max_pages: body.max_pages.unwrap_or(defaults.max_pages),
        include_external: body.include_external.unwrap_or(false),
        score_threshold: body.score_threshold,
        timeout: body.timeout.map_or(defaults.timeout, Duration::from_secs),
        retention: parse_retention(body.retention_policy.as_deref())?,
        tags: parse_tags(body.tags.as_deref())?,
        session_id: None,
        store,
    })
}

pub async fn deep_crawl(
    State(state): State<AppState>,
    Json(body): Json<DeepCrawlBody>,
) -> ApiResult {
    let options = deep_options(&body, false)?;
    let report = state.engine.deep_crawl(&body.url, options).await?;
    Ok(envelope(serde_json::to_value(report).map_err(Error::from)?))
}

pub async fn deep_crawl_store(
    State(state): State<AppState>,
    Json(body): Json<DeepCrawlBody>,
) -> ApiResult {
    let options = deep_options(&body, true)?;
    let report = state.engine.deep_crawl(&body.url, options).await?;
    Ok(envelope(serde_json::to_value(report).map_err(Error::from)?))
}

// ---------------------------------------------------------------------------
// Search routes

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    query: String,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    tags: Option<String>,
}

pub async fn search(State(state): State<AppState>, Json(body): Json<SearchBody>) -> ApiResult {
    let tags = parse_tags(body.tags.as_deref())?;
    let tags = (!tags.is_empty()).then_some(tags);
    let hits = state
        .engine
        .search(&body.query, body.limit.unwrap_or(10), tags.as_deref())
        .await?;
    let count = hits.len();
    Ok(envelope(json!({"results": hits, "count": count})))
}

#[derive(Debug, Deserialize)]
pub struct TargetSearchBody {
    query: String,
    #[serde(default)]
    initial_limit: Option<u32>,
    #[serde(default)]
    expanded_limit: Option<u32>,
    #[serde(default)]
    tags: Option<String>,
}

pub async fn target_search(
    State(state): State<AppState>,
    Json(body): Json<TargetSearchBody>,
) -> ApiResult {
    let tags = parse_tags(body.tags.as_deref())?;
    let tags = (!tags.is_empty()).then_some(tags);
    let result = state
        .engine
        .target_search(
            &body.query,
            body.initial_limit.unwrap_or(5),
            body.expanded_limit.unwrap_or(20),
            tags.as_deref(),
        )
        .await?;
    Ok(envelope(serde_json::to_value(result).map_err(Error::from)?))
}

// ---------------------------------------------------------------------------
// Memory routes

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

pub async fn list_memory(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let rows = state
        .engine
        .list_memory(
            query.filter.as_deref(),
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;
    let count = rows.len();
    Ok(envelope(json!({"content": rows, "count": count})))
}

#[derive(Debug, Deserialize)]
pub struct ForgetQuery {
    url: String,
}

pub async fn forget_url(
    State(state): State<AppState>,
    Query(query): Query<ForgetQuery>,
) -> ApiResult {
    let removed = state.engine.forget_url(&query.url).await?;
    Ok(envelope(json!({"url": query.url, "removed": removed})))
}

pub async fn clear_temp(State(state): State<AppState>) -> ApiResult {
    let removed = state.engine.clear_temp_memory().await?;
    Ok(envelope(
        json!({"removed": removed, "session_id": state.engine.session_id()}),
    ))
}

// ---------------------------------------------------------------------------
// Stats routes

pub async fn stats(State(state): State<AppState>) -> ApiResult {
    Ok(envelope(state.engine.database_stats().await?))
}

pub async fn db_stats(State(state): State<AppState>) -> ApiResult {
    Ok(envelope(state.engine.database_stats().await?))
}

pub async fn domains(State(state): State<AppState>) -> ApiResult {
    let domains = state.engine.list_domains().await?;
    let count = domains.len();
    Ok(envelope(json!({"domains": domains, "count": count})))
}

// ---------------------------------------------------------------------------
// Blocklist routes

pub async fn list_blocked(State(state): State<AppState>) -> ApiResult {
    let patterns = state.engine.list_blocked_domains().await?;
    let count = patterns.len();
    Ok(envelope(json!({"patterns": patterns, "count": count})))
}

#[derive(Debug, Deserialize)]
pub struct BlockBody {
    pattern: String,
    #[serde(default)]
    description: Option<String>,
}

pub async fn block_domain(
    State(state): State<AppState>,
    Json(body): Json<BlockBody>,
) -> ApiResult {
    let added = state
        .engine
        .block_domain(&body.pattern, body.description.as_deref().unwrap_or(""))
        .await?;
    Ok(envelope(serde_json::to_value(added).map_err(Error::from)?))
}

#[derive(Debug, Deserialize)]
pub struct UnblockQuery {
    pattern: String,
    #[serde(default)]
    keyword: Option<String>,
}

pub async fn unblock_domain(
    State(state): State<AppState>,
    Query(query): Query<UnblockQuery>,
) -> ApiResult {
    let keyword = query.keyword.as_deref().unwrap_or("");
    state.engine.unblock_domain(&query.pattern, keyword).await?;
    Ok(envelope(json!({"pattern": query.pattern, "removed": true})))
}
