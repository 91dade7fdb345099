//! Markdown cleaner: strips navigation chrome from crawled pages before
//! chunking, and reports how aggressive the strip was.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Lines whose lowercase form contains any of these are navigation chrome.
pub(crate) const NAV_KEYWORDS: &[&str] = &[
    "navigation",
    "menu",
    "sidebar",
    "breadcrumb",
    "skip to",
    "table of contents",
    "on this page",
    "sign in",
    "log in",
    "subscribe",
    "follow us",
    "share on",
    "copyright ©",
    "all rights reserved",
    "privacy policy",
    "terms of service",
    "back to top",
];

/// Social platforms whose mention marks a line as share/follow chrome.
const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
    "pinterest.com",
];

/// A line that is nothing but a markdown link (optionally bulleted).
static LINK_ONLY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[\s*\-]+\[.*?\]\s*\(.*?\)\s*$").unwrap()
});

/// Three or more consecutive newlines.
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\n{3,}").unwrap()
});

/// Cleaned text plus reduction statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub text: String,
    pub original_lines: usize,
    pub cleaned_lines: usize,
    pub reduction: f32,
    pub nav_hits: usize,
    pub is_clean: bool,
}

fn is_navigation_line(lower: &str) -> bool {
    NAV_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn mentions_social_domain(lower: &str) -> bool {
    SOCIAL_DOMAINS.iter().any(|domain| lower.contains(domain))
}

/// Clean raw markdown fetched from `source_url`.
///
/// A page is considered clean when no more than 70% of its lines were
/// dropped and at most 10 navigation indicators were seen; pages failing
/// that bar are still usable, the pipeline just records a warning.
pub fn clean_markdown(raw: &str, source_url: &str) -> CleanReport {
    let lines: Vec<&str> = raw.lines().collect();
    let original_lines = lines.len();

    let mut nav_hits = 0usize;
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    for line in &lines {
        let lower = line.to_lowercase();
        if is_navigation_line(&lower) {
            nav_hits += 1;
            continue;
        }
        if mentions_social_domain(&lower) {
            continue;
        }
        if LINK_ONLY_LINE.is_match(line) {
            continue;
        }
        kept.push(line);
    }

    let joined = kept.join("\n");
    let text = EXCESS_NEWLINES.replace_all(&joined, "\n\n").into_owned();

    let cleaned_lines = kept.iter().filter(|l| !l.trim().is_empty()).count();
    let counted_original = lines.iter().filter(|l| !l.trim().is_empty()).count();
    let reduction = if counted_original == 0 {
        0.0
    } else {
        1.0 - (cleaned_lines as f32 / counted_original as f32)
    };
    let is_clean = reduction <= 0.7 && nav_hits <= 10;

    debug!(
        url = source_url,
        original_lines, cleaned_lines, nav_hits, reduction, "cleaned markdown"
    );

    CleanReport {
        text,
        original_lines,
        cleaned_lines,
        reduction,
        nav_hits,
        is_clean,
    }
}
