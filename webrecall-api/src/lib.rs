#![allow(clippy::missing_errors_doc)]

//! # webrecall API
//!
//! The HTTP+JSON surface over a [`webrecall_core::engine::RecallEngine`]:
//! crawl, search, memory, stats, and blocklist-admin routes, guarded by
//! bearer-token auth with per-key rate limiting. `/health` is public.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use tracing::info;

use webrecall_core::engine::RecallEngine;

use auth::RateGate;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecallEngine>,
    pub gate: Arc<RateGate>,
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(engine: Arc<RecallEngine>, api_key: Option<String>, rate_limit: u32) -> Self {
        AppState {
            engine,
            gate: Arc::new(RateGate::new(rate_limit)),
            api_key,
        }
    }
}

/// Build the full router. Every `/api/v1` route passes the auth/rate gate.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/status", get(handlers::status))
        .route("/api/v1/help", get(handlers::help))
        .route("/api/v1/crawl", post(handlers::crawl))
        .route("/api/v1/crawl/store", post(handlers::crawl_store))
        .route("/api/v1/crawl/temp", post(handlers::crawl_temp))
        .route("/api/v1/crawl/deep", post(handlers::deep_crawl))
        .route("/api/v1/crawl/deep/store", post(handlers::deep_crawl_store))
        .route("/api/v1/search", post(handlers::search))
        .route("/api/v1/search/target", post(handlers::target_search))
        .route(
            "/api/v1/memory",
            get(handlers::list_memory).delete(handlers::forget_url),
        )
        .route("/api/v1/memory/temp", delete(handlers::clear_temp))
        .route("/api/v1/stats", get(handlers::stats))
        .route("/api/v1/db/stats", get(handlers::db_stats))
        .route("/api/v1/domains", get(handlers::domains))
        .route(
            "/api/v1/blocked-domains",
            get(handlers::list_blocked)
                .post(handlers::block_domain)
                .delete(handlers::unblock_domain),
        )
        .layer(from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(host, port, "api listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
