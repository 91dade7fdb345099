//! Tool dispatcher: tool name + JSON arguments → one engine operation →
//! `{success, data|error, timestamp}` envelope.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use webrecall_core::crawler::DeepCrawlOptions;
use webrecall_core::engine::RecallEngine;
use webrecall_core::error::{Error, Result};
use webrecall_core::types::{now_rfc3339, RetentionPolicy};
use webrecall_core::validate;

use crate::remote::RemoteClient;

/// Where tool calls are executed: a local engine, or a remote webrecall
/// instance in client-forward mode.
pub enum ToolBackend {
    Local(Arc<RecallEngine>),
    Remote(RemoteClient),
}

/// Wrap a successful payload in the standard envelope.
pub fn ok_envelope(data: Value) -> Value {
    json!({"success": true, "data": data, "timestamp": now_rfc3339()})
}

/// Wrap a failure in the standard envelope.
pub fn err_envelope(error: &Error) -> Value {
    json!({"success": false, "error": error.to_string(), "timestamp": now_rfc3339()})
}

#[derive(Debug, Deserialize)]
struct UrlArgs {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CrawlStoreArgs {
    url: String,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    retention_policy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeepCrawlArgs {
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

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    tags: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TargetSearchArgs {
    query: String,
    #[serde(default)]
    initial_limit: Option<u32>,
    #[serde(default)]
    expanded_limit: Option<u32>,
    #[serde(default)]
    tags: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListMemoryArgs {
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct BlockArgs {
    pattern: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnblockArgs {
    pattern: String,
    keyword: String,
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| Error::validation("arguments", e.to_string()))
}

fn parse_tags(raw: Option<&str>) -> Result<Vec<String>> {
    match raw {
        Some(raw) => validate::tags(raw),
        None => Ok(Vec::new()),
    }
}

fn parse_retention(raw: Option<&str>) -> Result<RetentionPolicy> {
    match raw {
        Some(token) => validate::retention(token),
        None => Ok(RetentionPolicy::Permanent),
    }
}

fn deep_options(args: &DeepCrawlArgs, store: bool) -> Result<DeepCrawlOptions> {
    let defaults = DeepCrawlOptions::default();
    Ok(DeepCrawlOptions {
        max_depth: args.max_depth.unwrap_or(defaults.max_depth),
        max_pages: args.max_pages.unwrap_or(defaults.max_pages),
        include_external: args.include_external.unwrap_or(false),
        score_threshold: args.score_threshold,
        timeout: args
            .timeout
            .map_or(defaults.timeout, Duration::from_secs),
        retention: parse_retention(args.retention_policy.as_deref())?,
        tags: parse_tags(args.tags.as_deref())?,
        session_id: None,
        store,
    })
}

/// Execute one named tool against the local engine.
async fn dispatch_local(engine: &RecallEngine, name: &str, args: &Value) -> Result<Value> {
    match name {
        "crawl_url" => {
            let args: UrlArgs = parse_args(args)?;
            let preview = engine.crawl_preview(&args.url).await?;
            Ok(serde_json::to_value(preview)?)
        }
        "crawl_and_remember" => {
            let args: CrawlStoreArgs = parse_args(args)?;
            let tags = parse_tags(args.tags.as_deref())?;
            let retention = parse_retention(args.retention_policy.as_deref())?;
            let report = engine.crawl_and_remember(&args.url, tags, retention).await?;
            Ok(serde_json::to_value(report)?)
        }
        "crawl_temp" => {
            let args: CrawlStoreArgs = parse_args(args)?;
            let tags = parse_tags(args.tags.as_deref())?;
            let report = engine.crawl_temp(&args.url, tags).await?;
            Ok(serde_json::to_value(report)?)
        }
        "deep_crawl_dfs" => {
            let args: DeepCrawlArgs = parse_args(args)?;
            let options = deep_options(&args, false)?;
            let report = engine.deep_crawl(&args.url, options).await?;
            Ok(serde_json::to_value(report)?)
        }
        "deep_crawl_and_store" => {
            let args: DeepCrawlArgs = parse_args(args)?;
            let options = deep_options(&args, true)?;
            let report = engine.deep_crawl(&args.url, options).await?;
            Ok(serde_json::to_value(report)?)
        }
        "search_memory" => {
            let args: SearchArgs = parse_args(args)?;
            let tags = parse_tags(args.tags.as_deref())?;
            let tags = (!tags.is_empty()).then_some(tags);
            let hits = engine
                .search(&args.query, args.limit.unwrap_or(10), tags.as_deref())
                .await?;
            let count = hits.len();
            Ok(json!({"results": hits, "count": count}))
        }
        "target_search" => {
            let args: TargetSearchArgs = parse_args(args)?;
            let tags = parse_tags(args.tags.as_deref())?;
            let tags = (!tags.is_empty()).then_some(tags);
            let result = engine
                .target_search(
                    &args.query,
                    args.initial_limit.unwrap_or(5),
                    args.expanded_limit.unwrap_or(20),
                    tags.as_deref(),
                )
                .await?;
            Ok(serde_json::to_value(result)?)
        }
        "list_memory" => {
            let args: ListMemoryArgs = parse_args(args)?;
            let rows = engine
                .list_memory(
                    args.filter.as_deref(),
                    args.limit.unwrap_or(50),
                    args.offset.unwrap_or(0),
                )
                .await?;
            let count = rows.len();
            Ok(json!({"content": rows, "count": count}))
        }
        "forget_url" => {
            let args: UrlArgs = parse_args(args)?;
            let removed = engine.forget_url(&args.url).await?;
            Ok(json!({"url": args.url, "removed": removed}))
        }
        "clear_temp_memory" => {
            let removed = engine.clear_temp_memory().await?;
            Ok(json!({"removed": removed, "session_id": engine.session_id()}))
        }
        "get_database_stats" => engine.database_stats().await,
        "list_domains" => {
            let domains = engine.list_domains().await?;
            let count = domains.len();
            Ok(json!({"domains": domains, "count": count}))
        }
        "block_domain" => {
            let args: BlockArgs = parse_args(args)?;
            let added = engine
                .block_domain(&args.pattern, args.description.as_deref().unwrap_or(""))
                .await?;
            Ok(serde_json::to_value(added)?)
        }
        "unblock_domain" => {
            let args: UnblockArgs = parse_args(args)?;
            engine.unblock_domain(&args.pattern, &args.keyword).await?;
            Ok(json!({"pattern": args.pattern, "removed": true}))
        }
        "list_blocked_domains" => {
            let patterns = engine.list_blocked_domains().await?;
            let count = patterns.len();
            Ok(json!({"patterns": patterns, "count": count}))
        }
        unknown => Err(Error::NotFound(format!("unknown tool '{unknown}'"))),
    }
}

/// Execute one named tool and wrap the outcome in the standard envelope.
pub async fn dispatch(backend: &ToolBackend, name: &str, args: &Value) -> Value {
    debug!(tool = name, "dispatching tool call");
    match backend {
        ToolBackend::Local(engine) => match dispatch_local(engine, name, args).await {
            Ok(data) => ok_envelope(data),
            Err(err) => err_envelope(&err),
        },
        ToolBackend::Remote(client) => match client.forward(name, args).await {
            Ok(envelope) => envelope,
            Err(err) => err_envelope(&err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelopes_carry_timestamps() {
        let ok = ok_envelope(json!({"x": 1}));
        assert_eq!(ok["success"], json!(true));
        assert!(ok["timestamp"].as_str().unwrap().contains('T'));

        let err = err_envelope(&Error::validation("url", "bad"));
        assert_eq!(err["success"], json!(false));
        assert!(err["error"].as_str().unwrap().contains("url"));
    }

    #[test]
    fn arg_structs_tolerate_missing_optionals() {
        let args: CrawlStoreArgs =
            parse_args(&json!({"url": "https://example.test"})).unwrap();
        assert!(args.tags.is_none());
        assert!(args.retention_policy.is_none());

        let err = parse_args::<UrlArgs>(&json!({})).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn deep_options_fill_defaults() {
        let args: DeepCrawlArgs = parse_args(&json!({"url": "https://example.test"})).unwrap();
        let options = deep_options(&args, true).unwrap();
        assert_eq!(options.max_depth, 2);
        assert_eq!(options.max_pages, 20);
        assert!(!options.include_external);
        assert!(options.store);
    }
}
