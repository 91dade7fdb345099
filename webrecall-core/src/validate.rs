//! Input sanitization for every string that crosses a trust boundary.
//!
//! All checks are pure and synchronous. Each function either returns the
//! sanitized value or `Error::Validation` naming the field and reason; the
//! validator never logs and never touches shared state.

use std::sync::LazyLock;

use regex::Regex;

use crate::constants::{
    MAX_DESCRIPTION_LEN, MAX_PATTERN_LEN, MAX_QUERY_LEN, MAX_TAG_LEN, MAX_TAGS_LEN, MAX_TITLE_LEN,
    MAX_URL_LEN, MIN_PATTERN_LEN,
};
use crate::error::{Error, Result};
use crate::types::RetentionPolicy;

/// SQL verbs and schema names rejected as whole words in any input.
const SQL_WORD_TOKENS: &[&str] = &[
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "DROP",
    "CREATE",
    "ALTER",
    "TRUNCATE",
    "EXEC",
    "UNION",
    "JOIN",
    "MERGE",
    "LOAD_FILE",
    "SLEEP",
    "BENCHMARK",
    "INFORMATION_SCHEMA",
    "SYSOBJECTS",
    "SYSCOLUMNS",
    "SQLITE_MASTER",
];

/// Multi-word and symbol sequences rejected as substrings of the uppercased
/// input.
const SQL_SEQUENCE_TOKENS: &[&str] = &[
    "INTO OUTFILE",
    "WAITFOR DELAY",
    "--",
    "/*",
    "*/",
    "OR 1=1",
    "AND 1=1",
    "<SCRIPT",
    "JAVASCRIPT:",
    "ONERROR=",
    "ONLOAD=",
];

/// Substrings that mark a URL as adult content.
const ADULT_TOKENS: &[&str] = &[
    "porn", "xxx", "hentai", "erotic", "nsfw", "camgirl", "escort",
];

/// Control characters rejected everywhere (NUL plus the C0 set minus \t \n \r).
fn has_forbidden_control(input: &str) -> bool {
    input
        .chars()
        .any(|c| c == '\0' || (c.is_control() && c != '\t' && c != '\n' && c != '\r'))
}

static SQL_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = SQL_WORD_TOKENS.join("|");
    #[allow(clippy::unwrap_used)]
    Regex::new(&format!(r"\b(?:{alternation})\b")).unwrap()
});

static STACKED_QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r";\s*(?:SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|TRUNCATE|EXEC)\b").unwrap()
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z0-9 _-]+$").unwrap()
});

static HOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.-]*$").unwrap()
});

/// Reject dangerous SQL/script fragments in an uppercased copy of the input.
fn check_injection(field: &str, input: &str) -> Result<()> {
    let upper = input.to_uppercase();
    if SQL_WORD_RE.is_match(&upper) {
        return Err(Error::validation(field, "contains a forbidden SQL keyword"));
    }
    for seq in SQL_SEQUENCE_TOKENS {
        if upper.contains(seq) {
            return Err(Error::validation(
                field,
                format!("contains forbidden sequence '{seq}'"),
            ));
        }
    }
    if STACKED_QUERY_RE.is_match(&upper) {
        return Err(Error::validation(field, "contains a stacked query"));
    }
    if upper.contains('#') {
        return Err(Error::validation(field, "contains a comment marker"));
    }
    Ok(())
}

/// Validate a free-form string field against length and injection rules.
pub fn string(field: &str, input: &str, max_len: usize) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    if trimmed.len() > max_len {
        return Err(Error::validation(
            field,
            format!("exceeds maximum length {max_len}"),
        ));
    }
    if has_forbidden_control(trimmed) {
        return Err(Error::validation(field, "contains control characters"));
    }
    check_injection(field, trimmed)?;
    Ok(trimmed.to_string())
}

/// Validate a search query.
pub fn query(input: &str) -> Result<String> {
    string("query", input, MAX_QUERY_LEN)
}

/// Validate a page title. Titles come from crawled pages, so bad input is
/// stripped rather than rejected.
pub fn title(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_TITLE_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Validate a description for a block pattern.
pub fn description(input: &str) -> Result<String> {
    if input.trim().is_empty() {
        return Ok(String::new());
    }
    string("description", input, MAX_DESCRIPTION_LEN)
}

/// Validate a URL: structure, length, control characters, adult-content
/// markers, and SQL fragments in query parameters.
pub fn url(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("url", "must not be empty"));
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(Error::validation(
            "url",
            format!("exceeds maximum length {MAX_URL_LEN}"),
        ));
    }
    if has_forbidden_control(trimmed) || trimmed.contains(char::is_whitespace) {
        return Err(Error::validation("url", "contains forbidden characters"));
    }

    let lower = trimmed.to_lowercase();
    for token in ADULT_TOKENS {
        if lower.contains(token) {
            return Err(Error::validation("url", "adult content is not accepted"));
        }
    }
    for fragment in ["<script", "javascript:", "onerror=", "onload="] {
        if lower.contains(fragment) {
            return Err(Error::validation("url", "contains a script fragment"));
        }
    }

    if let Some((scheme, rest)) = trimmed.split_once("://") {
        if !matches!(scheme, "http" | "https") {
            return Err(Error::validation(
                "url",
                format!("unsupported scheme '{scheme}'"),
            ));
        }
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() {
            return Err(Error::validation("url", "missing host"));
        }
    }

    if let Some((_, params)) = trimmed.split_once('?') {
        let upper = params.to_uppercase();
        if SQL_WORD_RE.is_match(&upper) || STACKED_QUERY_RE.is_match(&upper) {
            return Err(Error::validation(
                "url",
                "query parameters contain SQL fragments",
            ));
        }
    }

    Ok(trimmed.to_string())
}

/// Parse an integer and enforce an inclusive range.
pub fn integer(field: &str, input: i64, min: i64, max: i64) -> Result<i64> {
    if input < min || input > max {
        return Err(Error::validation(
            field,
            format!("must be between {min} and {max}"),
        ));
    }
    Ok(input)
}

/// Accept common textual boolean spellings case-insensitively.
pub fn boolean(field: &str, input: &str) -> Result<bool> {
    match input.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(Error::validation(
            field,
            format!("'{other}' is not a boolean"),
        )),
    }
}

/// Whitelist retention tokens.
pub fn retention(input: &str) -> Result<RetentionPolicy> {
    RetentionPolicy::parse(input.trim())
}

/// Validate a comma-separated tag list. Returns the individual tags.
pub fn tags(input: &str) -> Result<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.len() > MAX_TAGS_LEN {
        return Err(Error::validation(
            "tags",
            format!("exceeds maximum length {MAX_TAGS_LEN}"),
        ));
    }
    let mut out = Vec::new();
    for raw in trimmed.split(',') {
        let tag = raw.trim();
        if tag.is_empty() {
            continue;
        }
        if tag.len() > MAX_TAG_LEN {
            return Err(Error::validation(
                "tags",
                format!("tag '{tag}' exceeds maximum length {MAX_TAG_LEN}"),
            ));
        }
        if !TAG_RE.is_match(tag) {
            return Err(Error::validation(
                "tags",
                format!("tag '{tag}' contains invalid characters"),
            ));
        }
        out.push(tag.to_string());
    }
    Ok(out)
}

/// Validate a blocklist pattern: `*.tld`, `*kw*`, or a plain host.
pub fn block_pattern(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.len() < MIN_PATTERN_LEN || trimmed.len() > MAX_PATTERN_LEN {
        return Err(Error::validation(
            "pattern",
            format!("length must be between {MIN_PATTERN_LEN} and {MAX_PATTERN_LEN}"),
        ));
    }
    if has_forbidden_control(trimmed) || trimmed.contains(char::is_whitespace) {
        return Err(Error::validation("pattern", "contains forbidden characters"));
    }

    let ok = if let Some(tld) = trimmed.strip_prefix("*.") {
        !tld.is_empty() && HOST_RE.is_match(tld)
    } else if trimmed.starts_with('*') && trimmed.ends_with('*') && trimmed.len() > 2 {
        let kw = &trimmed[1..trimmed.len() - 1];
        !kw.is_empty() && !kw.contains('*')
    } else {
        HOST_RE.is_match(trimmed)
    };

    if ok {
        Ok(trimmed.to_string())
    } else {
        Err(Error::validation(
            "pattern",
            "must be '*.tld', '*keyword*', or a plain host",
        ))
    }
}
