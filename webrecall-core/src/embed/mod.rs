//! Embedding provider trait and vector math helpers.
//!
//! Providers map batches of chunk text to fixed-dimension float32 vectors
//! and must be deterministic for a fixed model and input ordering. Every
//! vector handed to storage or search is L2-normalized first, which lets the
//! vector index run on plain L2 distance while similarity stays cosine.

mod hash;
mod http;

pub use hash::HashEmbedder;
pub use http::HttpEmbedder;

use async_trait::async_trait;

use crate::error::Result;

/// Converts text to dense vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        Ok(vectors.pop().unwrap_or_default())
    }

    /// Dimension of every produced vector.
    fn dimension(&self) -> usize;

    /// Model identifier, reported in status output.
    fn model_name(&self) -> &str;
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity of two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot / (na * nb)
}

/// Recover cosine similarity from the L2 distance between unit vectors.
pub fn similarity_from_l2(distance: f32) -> f32 {
    (1.0 - (distance * distance) / 2.0).clamp(-1.0, 1.0)
}
