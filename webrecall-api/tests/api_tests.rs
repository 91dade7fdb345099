//! Router tests: auth, rate limiting, status mapping, and envelopes, over a
//! stub storage backend.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use tower::ServiceExt;

use webrecall_api::{build_router, AppState};
use webrecall_core::embed::HashEmbedder;
use webrecall_core::engine::RecallEngine;
use webrecall_core::error::{Error, FetchKind, Result};
use webrecall_core::fetch::PageFetcher;
use webrecall_core::storage::{ContentStore, SyncMetricsSnapshot};
use webrecall_core::types::{
    BlockPattern, ChunkHit, ContentSummary, DomainCount, FetchedPage, KgStatus, StoreOutcome,
    StoreStats, StoredDocument,
};
use webrecall_core::RuntimeConfig;

#[derive(Default)]
struct StubStore {
    patterns: Mutex<Vec<BlockPattern>>,
}

#[async_trait]
impl ContentStore for StubStore {
    async fn store_document(&self, doc: StoredDocument) -> Result<StoreOutcome> {
        Ok(StoreOutcome {
            content_id: 1,
            replaced: false,
            chunks_stored: doc.chunks.len(),
        })
    }

    async fn forget_url(&self, _url: &str) -> Result<u64> {
        Ok(0)
    }

    async fn clear_session(&self, _session_id: &str) -> Result<u64> {
        Ok(0)
    }

    async fn list_content(
        &self,
        _filter: Option<&str>,
        _limit: u32,
        _offset: u32,
    ) -> Result<Vec<ContentSummary>> {
        Ok(Vec::new())
    }

    async fn vector_search(&self, _query: &[f32], _k: u32) -> Result<Vec<ChunkHit>> {
        Ok(Vec::new())
    }

    async fn register_session(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats::default())
    }

    async fn domain_counts(&self) -> Result<Vec<DomainCount>> {
        Ok(Vec::new())
    }

    async fn enqueue_kg(
        &self,
        _content_id: i64,
        _status: KgStatus,
        _skipped_reason: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    async fn sweep_expired(&self, _now_epoch: i64) -> Result<u64> {
        Ok(0)
    }

    async fn list_block_patterns(&self) -> Result<Vec<BlockPattern>> {
        Ok(self.patterns.lock().clone())
    }

    async fn add_block_pattern(&self, pattern: &str, description: &str) -> Result<()> {
        let mut patterns = self.patterns.lock();
        if patterns.iter().any(|p| p.pattern == pattern) {
            return Err(Error::validation("pattern", "already blocked"));
        }
        patterns.push(BlockPattern {
            pattern: pattern.to_string(),
            description: description.to_string(),
            created_at: 0,
        });
        Ok(())
    }

    async fn remove_block_pattern(&self, pattern: &str) -> Result<bool> {
        let mut patterns = self.patterns.lock();
        let before = patterns.len();
        patterns.retain(|p| p.pattern != pattern);
        Ok(patterns.len() < before)
    }

    async fn sync_metrics(&self) -> Result<Option<SyncMetricsSnapshot>> {
        Ok(None)
    }
}

struct DeadFetcher;

#[async_trait]
impl PageFetcher for DeadFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        Err(Error::Fetch {
            kind: FetchKind::Network,
            message: format!("no route to {url}"),
        })
    }
}

async fn test_router(api_key: Option<&str>, rate_limit: u32) -> Router {
    let mut config = RuntimeConfig::default();
    config.block_removal_token = Some("letmein".to_string());
    let engine = RecallEngine::new(
        Arc::new(StubStore::default()),
        Arc::new(HashEmbedder::new()),
        Arc::new(DeadFetcher),
        &config,
    )
    .await
    .unwrap();
    let state = AppState::new(Arc::new(engine), api_key.map(str::to_string), rate_limit);
    build_router(state)
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(path: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let router = test_router(Some("secret"), 60).await;
    let response = router.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let router = test_router(Some("secret"), 60).await;
    let response = router.oneshot(get("/api/v1/status", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let router = test_router(Some("secret"), 60).await;
    let response = router
        .oneshot(get("/api/v1/status", Some("nope")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_token_passes() {
    let router = test_router(Some("secret"), 60).await;
    let response = router
        .oneshot(get("/api/v1/status", Some("secret")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["storage"], "healthy");
}

#[tokio::test]
async fn requests_past_the_limit_get_429() {
    let router = test_router(Some("secret"), 2).await;
    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(get("/api/v1/status", Some("secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = router
        .oneshot(get("/api/v1/status", Some("secret")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn validation_failures_are_400() {
    let router = test_router(Some("secret"), 60).await;
    let response = router
        .oneshot(post_json(
            "/api/v1/search",
            Some("secret"),
            serde_json::json!({"query": "DROP TABLE users"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("query"));
}

#[tokio::test]
async fn unknown_url_deletion_is_404() {
    let router = test_router(Some("secret"), 60).await;
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/memory?url=https://example.test/missing")
        .header(header::AUTHORIZATION, "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fetch_failures_map_to_bad_gateway() {
    let router = test_router(Some("secret"), 60).await;
    let response = router
        .oneshot(post_json(
            "/api/v1/crawl",
            Some("secret"),
            serde_json::json!({"url": "https://unreachable.test/"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn blocklist_admin_round_trip() {
    let router = test_router(Some("secret"), 60).await;

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/blocked-domains",
            Some("secret"),
            serde_json::json!({"pattern": "*.evil", "description": "test"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Duplicate add is rejected.
    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/blocked-domains",
            Some("secret"),
            serde_json::json!({"pattern": "*.evil"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Removal without the out-of-band keyword is unauthorized.
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/blocked-domains?pattern=*.evil&keyword=wrong")
        .header(header::AUTHORIZATION, "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // With the right keyword it goes through.
    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/blocked-domains?pattern=*.evil&keyword=letmein")
        .header(header::AUTHORIZATION, "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn no_configured_key_disables_auth_but_not_rate_limiting() {
    let router = test_router(None, 1).await;
    let response = router
        .clone()
        .oneshot(get("/api/v1/status", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = router.oneshot(get("/api/v1/status", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
