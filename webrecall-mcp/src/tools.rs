//! The tool catalog exposed through `tools/list` and the HTTP help route.

use serde::Serialize;
use serde_json::{json, Value};

/// One tool definition.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Tool {
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

/// Every tool the dispatcher understands.
pub fn catalog() -> Vec<Tool> {
    let url_prop = json!({"type": "string", "description": "Absolute URL to crawl"});
    let tags_prop = json!({"type": "string", "description": "Comma-separated tags"});
    let retention_prop = json!({
        "type": "string",
        "enum": ["permanent", "session_only", "30_days"],
        "description": "How long to keep the content",
    });
    let deep_props = json!({
        "url": url_prop.clone(),
        "max_depth": {"type": "integer", "minimum": 1, "maximum": 5},
        "max_pages": {"type": "integer", "minimum": 1, "maximum": 250},
        "include_external": {"type": "boolean"},
        "score_threshold": {"type": "number", "minimum": 0.0, "maximum": 1.0},
        "timeout": {"type": "integer", "description": "Overall crawl deadline in seconds"},
    });

    vec![
        tool(
            "crawl_url",
            "Fetch and clean a page without storing it",
            json!({"url": url_prop.clone()}),
            &["url"],
        ),
        tool(
            "crawl_and_remember",
            "Fetch a page and store it permanently (or with the given retention)",
            json!({"url": url_prop.clone(), "tags": tags_prop.clone(), "retention_policy": retention_prop.clone()}),
            &["url"],
        ),
        tool(
            "crawl_temp",
            "Fetch a page and store it for this session only",
            json!({"url": url_prop.clone(), "tags": tags_prop.clone()}),
            &["url"],
        ),
        tool(
            "deep_crawl_dfs",
            "Depth-first crawl from a seed URL, returning page previews without storing",
            deep_props.clone(),
            &["url"],
        ),
        tool(
            "deep_crawl_and_store",
            "Depth-first crawl from a seed URL, storing every accepted page",
            {
                let mut props = deep_props;
                props["tags"] = tags_prop.clone();
                props["retention_policy"] = retention_prop.clone();
                props
            },
            &["url"],
        ),
        tool(
            "search_memory",
            "Semantic search over stored content",
            json!({
                "query": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 1000},
                "tags": tags_prop.clone(),
            }),
            &["query"],
        ),
        tool(
            "target_search",
            "Two-pass search that discovers tags from an initial pass and re-queries with them",
            json!({
                "query": {"type": "string"},
                "initial_limit": {"type": "integer", "minimum": 1, "maximum": 1000},
                "expanded_limit": {"type": "integer", "minimum": 1, "maximum": 1000},
                "tags": tags_prop.clone(),
            }),
            &["query"],
        ),
        tool(
            "list_memory",
            "List stored content, newest first",
            json!({
                "filter": retention_prop.clone(),
                "limit": {"type": "integer", "minimum": 1, "maximum": 1000},
                "offset": {"type": "integer", "minimum": 0},
            }),
            &[],
        ),
        tool(
            "forget_url",
            "Remove a stored URL with its chunks and vectors",
            json!({"url": url_prop}),
            &["url"],
        ),
        tool(
            "clear_temp_memory",
            "Remove every page stored for this session",
            json!({}),
            &[],
        ),
        tool(
            "get_database_stats",
            "Row counts, retention breakdown, and sync health",
            json!({}),
            &[],
        ),
        tool(
            "list_domains",
            "Stored page counts per domain",
            json!({}),
            &[],
        ),
        tool(
            "block_domain",
            "Add a blocklist pattern (*.tld, *keyword*, or exact host)",
            json!({
                "pattern": {"type": "string"},
                "description": {"type": "string"},
            }),
            &["pattern"],
        ),
        tool(
            "unblock_domain",
            "Remove a blocklist pattern; requires the removal keyword",
            json!({
                "pattern": {"type": "string"},
                "keyword": {"type": "string", "description": "Out-of-band removal authorization"},
            }),
            &["pattern", "keyword"],
        ),
        tool(
            "list_blocked_domains",
            "List every blocklist pattern",
            json!({}),
            &[],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_the_full_tool_set() {
        let names: Vec<String> = catalog().into_iter().map(|t| t.name).collect();
        for expected in [
            "crawl_url",
            "crawl_and_remember",
            "crawl_temp",
            "deep_crawl_dfs",
            "deep_crawl_and_store",
            "search_memory",
            "target_search",
            "list_memory",
            "forget_url",
            "clear_temp_memory",
            "get_database_stats",
            "list_domains",
            "block_domain",
            "unblock_domain",
            "list_blocked_domains",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(names.len(), 15);
    }

    #[test]
    fn every_tool_has_an_object_schema() {
        for tool in catalog() {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
        }
    }
}
