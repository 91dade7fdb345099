//! Deterministic token-hash embedder.
//!
//! Maps each lowercased alphanumeric token into a handful of hash buckets
//! and L2-normalizes the result. Not a semantic model, but deterministic for
//! fixed input, cheap, and dimension-compatible with the real one, which
//! makes it the default when no embedding endpoint is configured and the
//! workhorse for tests: texts sharing vocabulary land near each other.

use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;

use super::{l2_normalize, EmbeddingProvider};
use crate::constants::EMBEDDING_DIM;
use crate::error::Result;

/// Hash-bucket embedding provider.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        HashEmbedder {
            dimension: EMBEDDING_DIM,
        }
    }

    #[cfg(test)]
    pub fn with_dimension(dimension: usize) -> Self {
        HashEmbedder { dimension }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            // Three buckets per token so collisions rarely cancel a word out.
            for salt in 0u8..3 {
                let mut hasher = DefaultHasher::new();
                salt.hash(&mut hasher);
                token.hash(&mut hasher);
                let digest = hasher.finish();
                let bucket = (digest % self.dimension as u64) as usize;
                let sign = if digest & (1 << 63) == 0 { 1.0 } else { -1.0 };
                vector[bucket] += sign;
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "token-hash-384"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::cosine_similarity;

    #[tokio::test]
    async fn deterministic_for_fixed_input() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed_one("rust async runtime").await.unwrap();
        let b = embedder.embed_one("rust async runtime").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIM);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new();
        let query = embedder.embed_one("tokio async runtime").await.unwrap();
        let near = embedder
            .embed_one("the tokio async runtime schedules tasks")
            .await
            .unwrap();
        let far = embedder
            .embed_one("gardening tips for tomato plants")
            .await
            .unwrap();
        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = HashEmbedder::new();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed_one("alpha").await.unwrap());
        assert_eq!(batch[1], embedder.embed_one("beta").await.unwrap());
    }
}
