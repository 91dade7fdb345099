//! Wildcard matching for blocked-domain patterns.
//!
//! Three pattern shapes are recognized:
//! - `*.tld` matches any host ending in `.tld` (and the bare `tld` host),
//! - `*keyword*` matches any URL containing `keyword`,
//! - anything else matches the host exactly.
//!
//! Persistence and the admin operations live on the storage engine; this
//! module is the pure matching core used at every ingestion gate.

use serde::Serialize;

/// Patterns seeded into a fresh blocklist store.
pub const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    ("*.ru", "Russian TLD"),
    ("*.cn", "Chinese TLD"),
    ("*porn*", "Adult content keyword"),
    ("*sex*", "Adult content keyword"),
];

/// Outcome of a blocklist check.
#[derive(Debug, Clone, Serialize)]
pub struct BlockDecision {
    pub blocked: bool,
    pub pattern: Option<String>,
    pub reason: Option<String>,
}

impl BlockDecision {
    pub fn allowed() -> Self {
        BlockDecision {
            blocked: false,
            pattern: None,
            reason: None,
        }
    }

    pub fn blocked_by(pattern: &str, description: &str) -> Self {
        BlockDecision {
            blocked: true,
            pattern: Some(pattern.to_string()),
            reason: Some(if description.is_empty() {
                format!("matched pattern '{pattern}'")
            } else {
                description.to_string()
            }),
        }
    }
}

/// Extract the host portion of a URL without requiring a scheme.
pub fn host_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .split('@')
        .next_back()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Check one pattern against one URL.
pub fn pattern_matches(pattern: &str, url: &str) -> bool {
    let host = host_of(url);
    if let Some(tld) = pattern.strip_prefix("*.") {
        let tld = tld.to_lowercase();
        return host.ends_with(&format!(".{tld}")) || host == tld;
    }
    if pattern.len() > 2 && pattern.starts_with('*') && pattern.ends_with('*') {
        let keyword = pattern[1..pattern.len() - 1].to_lowercase();
        return url.to_lowercase().contains(&keyword);
    }
    host == pattern.to_lowercase()
}

/// Find the first pattern in the list that blocks the URL.
pub fn first_match<'a, I>(patterns: I, url: &str) -> Option<(&'a str, &'a str)>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    patterns
        .into_iter()
        .find(|(pattern, _)| pattern_matches(pattern, url))
}

/// Decide whether a URL is blocked by any pattern in the list.
pub fn decide<'a, I>(patterns: I, url: &str) -> BlockDecision
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    match first_match(patterns, url) {
        Some((pattern, description)) => BlockDecision::blocked_by(pattern, description),
        None => BlockDecision::allowed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tld_pattern_matches_suffix() {
        assert!(pattern_matches("*.ru", "https://news.example.ru/page"));
        assert!(pattern_matches("*.ru", "http://example.ru"));
        assert!(!pattern_matches("*.ru", "https://example.rust-lang.org"));
    }

    #[test]
    fn keyword_pattern_matches_anywhere() {
        assert!(pattern_matches("*tracker*", "https://cdn.example.com/tracker.js"));
        assert!(pattern_matches("*Tracker*", "https://tracker.example.com"));
        assert!(!pattern_matches("*tracker*", "https://example.com/track"));
    }

    #[test]
    fn plain_pattern_matches_exact_host() {
        assert!(pattern_matches("ads.example.com", "https://ads.example.com/x"));
        assert!(!pattern_matches("ads.example.com", "https://sub.ads.example.com/x"));
        assert!(!pattern_matches("ads.example.com", "https://example.com/ads.example.com"));
    }

    #[test]
    fn host_extraction_handles_ports_and_userinfo() {
        assert_eq!(host_of("https://user@example.com:8443/a?b#c"), "example.com");
        assert_eq!(host_of("example.com/path"), "example.com");
    }

    #[test]
    fn first_match_returns_earliest() {
        let patterns = [("*.cn", "tld"), ("*shop*", "kw")];
        let hit = first_match(patterns.iter().map(|(p, d)| (*p, *d)), "https://shop.example.cn");
        assert_eq!(hit.unwrap().0, "*.cn");
    }

    #[test]
    fn decide_reports_pattern_and_reason() {
        let patterns = [("*.cn", "blocked tld")];
        let blocked = decide(patterns.iter().copied(), "https://example.cn");
        assert!(blocked.blocked);
        assert_eq!(blocked.pattern.as_deref(), Some("*.cn"));
        assert_eq!(blocked.reason.as_deref(), Some("blocked tld"));

        let allowed = decide(patterns.iter().copied(), "https://example.org");
        assert!(!allowed.blocked);
        assert!(allowed.pattern.is_none());
    }
}
