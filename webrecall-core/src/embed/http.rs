//! Remote embedding provider speaking the text-embeddings-inference wire
//! shape: `POST {endpoint}/embed {"inputs": [...]}` returning a float matrix.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{l2_normalize, EmbeddingProvider};
use crate::constants::EMBEDDING_DIM;
use crate::error::{Error, Result};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

/// HTTP embedding provider.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    /// Build a provider for the given endpoint. The endpoint is the service
    /// base URL; `/embed` is appended per request.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Embed(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpEmbedder {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension: EMBEDDING_DIM,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), endpoint = %self.endpoint, "embedding batch");

        let response = self
            .client
            .post(format!("{}/embed", self.endpoint))
            .json(&EmbedRequest { inputs: texts })
            .send()
            .await
            .map_err(|e| Error::Embed(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Embed(format!(
                "embedding service answered {}",
                response.status()
            )));
        }

        let mut matrix: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|e| Error::Embed(format!("malformed embedding response: {e}")))?;

        if matrix.len() != texts.len() {
            return Err(Error::Embed(format!(
                "expected {} vectors, got {}",
                texts.len(),
                matrix.len()
            )));
        }
        for vector in &mut matrix {
            if vector.len() != self.dimension {
                return Err(Error::Embed(format!(
                    "expected dimension {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
            l2_normalize(vector);
        }
        Ok(matrix)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
