//! Deterministic local embeddings
//!
//! Feature-hashes character n-grams and words into a fixed-size vector.
//! Needs no network or model download, so it backs offline use and tests.

use super::{normalize, EmbeddingService};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const LOCAL_MODEL_NAME: &str = "local-hashing";

/// Hashing embedder
pub struct HashingEmbeddingService {
    dimensions: usize,
}

impl HashingEmbeddingService {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimensions
    }

    /// Embed synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];

        let text_lower = text.to_lowercase();
        let chars: Vec<char> = text_lower.chars().collect();

        for window_size in 3..=4 {
            for window in chars.windows(window_size) {
                let gram: String = window.iter().collect();
                if gram.trim().is_empty() {
                    continue;
                }
                embedding[self.bucket(&gram)] += 1.0;
            }
        }

        // words weigh more than n-grams
        for word in text_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            embedding[self.bucket(word)] += 2.0;
        }

        normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        LOCAL_MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[tokio::test]
    async fn test_embedding_is_normalized() {
        let service = HashingEmbeddingService::new(384);
        let embedding = service.embed("Rust programming language").await.unwrap();

        assert_eq!(embedding.len(), 384);
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01, "Vector should be normalized");
    }

    #[test]
    fn test_deterministic() {
        let service = HashingEmbeddingService::new(128);
        assert_eq!(service.embed_text("quantum"), service.embed_text("quantum"));
    }

    #[test]
    fn test_similar_texts_have_similar_embeddings() {
        let service = HashingEmbeddingService::new(768);
        let emb1 = service.embed_text("quantum computing uses qubits");
        let emb2 = service.embed_text("how do qubits work in quantum computers");
        let emb3 = service.embed_text("a recipe for sourdough bread");

        let sim_12 = cosine_similarity(&emb1, &emb2);
        let sim_13 = cosine_similarity(&emb1, &emb3);

        assert!(sim_12 > sim_13, "Similar texts should have higher similarity");
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let service = HashingEmbeddingService::new(64);
        let batch = service.embed_batch(&["a b", "c d"]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], service.embed_text("c d"));
    }
}
