//! Embedding generation services for vector similarity search
//!
//! Provides both remote (Gemini) and local (feature hashing) embedding generation.

pub mod local;
pub mod remote;

pub use local::HashingEmbeddingService;
pub use remote::{GeminiEmbeddingService, GEMINI_EMBEDDING_DIM};

use crate::config::{EmbeddingProvider, TengenConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Embedding service trait defining required operations
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batched)
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensionality (e.g., 768 for text-embedding-004)
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Build the embedder selected in configuration
///
/// Falls back to the local embedder when Gemini is selected but no key is set.
pub fn from_config(config: &TengenConfig) -> Result<Arc<dyn EmbeddingService>> {
    match config.embeddings.provider {
        EmbeddingProvider::Gemini if config.llm_configured() => {
            info!("Using Gemini embeddings ({})", config.embeddings.model);
            Ok(Arc::new(GeminiEmbeddingService::new(
                config.llm.api_key.clone(),
                Some(config.embeddings.model.clone()),
                Some(config.llm.base_url.clone()),
                config.embeddings.dimensions,
            )?))
        }
        EmbeddingProvider::Gemini => {
            warn!("No Gemini key configured; using local hashing embeddings");
            Ok(Arc::new(HashingEmbeddingService::new(
                config.embeddings.dimensions,
            )))
        }
        EmbeddingProvider::Local => Ok(Arc::new(HashingEmbeddingService::new(
            config.embeddings.dimensions,
        ))),
    }
}

/// Scale a vector to unit length in place
pub fn normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for val in vector.iter_mut() {
            *val /= magnitude;
        }
    }
}

/// Calculate cosine similarity between two vectors
#[cfg(test)]
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let vec1 = vec![1.0, 0.0, 0.0];
        let vec2 = vec![1.0, 0.0, 0.0];
        let vec3 = vec![0.0, 1.0, 0.0];

        assert!((cosine_similarity(&vec1, &vec2) - 1.0).abs() < 0.01);
        assert!((cosine_similarity(&vec1, &vec3) - 0.0).abs() < 0.01);
        assert_eq!(cosine_similarity(&vec1, &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_from_config_without_key_is_local() {
        let config = TengenConfig::default();
        let embedder = from_config(&config).unwrap();
        assert_eq!(embedder.model_name(), local::LOCAL_MODEL_NAME);
        assert_eq!(embedder.dimensions(), 768);
    }
}
