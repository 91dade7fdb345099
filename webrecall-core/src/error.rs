//! Error taxonomy shared across the webrecall workspace.

/// Result type alias for webrecall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Kinds of upstream fetch failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// The request deadline elapsed
    Timeout,
    /// The crawler answered with a non-success status
    Http,
    /// Connection or transport failure
    Network,
    /// The crawler answered with a body we could not interpret
    Malformed,
}

impl std::fmt::Display for FetchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetchKind::Timeout => "timeout",
            FetchKind::Http => "http_error",
            FetchKind::Network => "network",
            FetchKind::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

/// Error types for the webrecall system
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("URL blocked by pattern '{pattern}'")]
    Blocked { pattern: String },

    #[error("Fetch failed ({kind}): {message}")]
    Fetch { kind: FetchKind, message: String },

    #[error("Embedding error: {0}")]
    Embed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database busy: {0}")]
    Contention(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Unauthorized: {0}")]
    Auth(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a validation failure on a named field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is recoverable (can retry with backoff)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Contention(_) => true,
            Error::Fetch { kind, .. } => matches!(kind, FetchKind::Timeout | FetchKind::Network),
            Error::Sync(_) => true,
            Error::Io(_) => true,
            Error::Validation { .. }
            | Error::Blocked { .. }
            | Error::Embed(_)
            | Error::Storage(_)
            | Error::Auth(_)
            | Error::RateLimited
            | Error::NotFound(_)
            | Error::Serialization(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_is_recoverable() {
        assert!(Error::Contention("database is locked".into()).is_recoverable());
        assert!(!Error::Storage("schema mismatch".into()).is_recoverable());
    }

    #[test]
    fn fetch_recoverability_depends_on_kind() {
        let timeout = Error::Fetch {
            kind: FetchKind::Timeout,
            message: "deadline elapsed".into(),
        };
        let http = Error::Fetch {
            kind: FetchKind::Http,
            message: "502".into(),
        };
        assert!(timeout.is_recoverable());
        assert!(!http.is_recoverable());
    }

    #[test]
    fn display_includes_field() {
        let err = Error::validation("url", "too long");
        assert_eq!(err.to_string(), "Validation failed for url: too long");
    }
}
