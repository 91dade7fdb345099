//! Bearer-token authentication and per-key rolling-window rate limiting.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;

use webrecall_core::error::Error;

use crate::error::ApiError;
use crate::AppState;

const WINDOW: Duration = Duration::from_secs(60);

/// Process-local rolling-window request counter, one window per token.
pub struct RateGate {
    limit_per_minute: u32,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateGate {
    pub fn new(limit_per_minute: u32) -> Self {
        RateGate {
            limit_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `token`; errors when the rolling 60 s window
    /// is already at the limit.
    pub fn check(&self, token: &str) -> Result<(), Error> {
        self.check_at(token, Instant::now())
    }

    fn check_at(&self, token: &str, now: Instant) -> Result<(), Error> {
        let mut windows = self.windows.lock();
        let window = windows.entry(token.to_string()).or_default();
        while window.front().is_some_and(|t| now.duration_since(*t) >= WINDOW) {
            window.pop_front();
        }
        if window.len() >= self.limit_per_minute as usize {
            return Err(Error::RateLimited);
        }
        window.push_back(now);
        Ok(())
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Middleware guarding every non-health route: 401 on a missing or wrong
/// key, 429 past the per-key rate limit.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request);

    if let Some(expected) = state.api_key.as_deref() {
        match token {
            Some(token) if token == expected => {}
            Some(_) => return Err(Error::Auth("invalid API key".to_string()).into()),
            None => return Err(Error::Auth("missing bearer token".to_string()).into()),
        }
    }

    let counter_key = token.unwrap_or("anonymous");
    state.gate.check(counter_key)?;

    Ok(next.run(request).await)
}
