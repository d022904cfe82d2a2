//! Remote embedding service using the Gemini API
//!
//! Calls `models/{model}:embedContent` and `:batchEmbedContents`.
//! Returned vectors are L2-normalised before use.

use super::{normalize, EmbeddingService};
use crate::error::{Result, TengenError};
use crate::services::llm::API_KEY_HEADER;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Embedding dimension for text-embedding-004
pub const GEMINI_EMBEDDING_DIM: usize = 768;

/// Maximum texts per batch request
const MAX_BATCH_SIZE: usize = 100;

/// Request timeout duration
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Gemini embedding service
pub struct GeminiEmbeddingService {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: EmbedContent,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiEmbeddingService {
    /// Create a new remote embedding service
    ///
    /// # Arguments
    /// * `api_key` - Google API key
    /// * `model` - Model name (defaults to "text-embedding-004")
    /// * `base_url` - API root (defaults to the public v1beta endpoint)
    /// * `dimensions` - Output dimensionality
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        dimensions: usize,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(TengenError::Validation(
                "API key cannot be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let model = model.unwrap_or_else(|| "text-embedding-004".to_string());
        let base_url = base_url
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
            dimensions,
        })
    }

    fn request_for(&self, text: &str) -> EmbedContentRequest {
        EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            output_dimensionality: self.dimensions,
        }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}/models/{}:{}", self.base_url, self.model, method);

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                TengenError::Embedding(format!("Embedding request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        match status {
            StatusCode::OK => response
                .json::<R>()
                .await
                .map_err(|e| {
                    TengenError::Embedding(format!(
                        "Failed to parse response: {}",
                        e.without_url()
                    ))
                }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TengenError::Embedding(
                "Invalid or missing API key".to_string(),
            )),
            _ => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());

                Err(TengenError::Embedding(format!(
                    "API error (status {}): {}",
                    status, error_text
                )))
            }
        }
    }

    /// Validate text input
    fn validate_text(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(TengenError::Validation(
                "Text cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Check dimensions and finiteness, then normalise
    fn finish(&self, mut embedding: Vec<f32>) -> Result<Vec<f32>> {
        if embedding.len() != self.dimensions {
            return Err(TengenError::Embedding(format!(
                "Expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            )));
        }

        if embedding.iter().any(|&x| !x.is_finite()) {
            return Err(TengenError::Embedding(
                "Embedding contains invalid values (NaN or Inf)".to_string(),
            ));
        }

        normalize(&mut embedding);
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingService for GeminiEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.validate_text(text)?;

        let response: EmbedContentResponse =
            self.post("embedContent", &self.request_for(text)).await?;

        self.finish(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        for text in texts {
            self.validate_text(text)?;
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            debug!("Embedding batch of {} texts with {}", chunk.len(), self.model);

            let body = BatchEmbedRequest {
                requests: chunk.iter().map(|t| self.request_for(t)).collect(),
            };
            let response: BatchEmbedResponse = self.post("batchEmbedContents", &body).await?;

            if response.embeddings.len() != chunk.len() {
                return Err(TengenError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    chunk.len(),
                    response.embeddings.len()
                )));
            }

            for embedding in response.embeddings {
                all_embeddings.push(self.finish(embedding.values)?);
            }
        }

        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> GeminiEmbeddingService {
        GeminiEmbeddingService::new("test-key".to_string(), None, None, 4).unwrap()
    }

    #[test]
    fn test_service_creation() {
        let service = GeminiEmbeddingService::new(
            "test-key".to_string(),
            None,
            None,
            GEMINI_EMBEDDING_DIM,
        )
        .unwrap();
        assert_eq!(service.dimensions(), GEMINI_EMBEDDING_DIM);
        assert_eq!(service.model_name(), "text-embedding-004");
    }

    #[test]
    fn test_empty_api_key_error() {
        let result = GeminiEmbeddingService::new("".to_string(), None, None, 768);
        assert!(result.is_err());
    }

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(service().request_for("hello")).unwrap();
        assert_eq!(body["model"], "models/text-embedding-004");
        assert_eq!(body["content"]["parts"][0]["text"], "hello");
        assert_eq!(body["outputDimensionality"], 4);
    }

    #[test]
    fn test_finish_validates_and_normalizes() {
        let service = service();
        assert!(service.validate_text("  ").is_err());

        let v = service.finish(vec![2.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0]);

        assert!(service.finish(vec![1.0; 3]).is_err());
        assert!(service.finish(vec![f32::NAN, 0.0, 0.0, 0.0]).is_err());
    }

    #[tokio::test]
    async fn test_transport_error_hides_api_key() {
        let service = GeminiEmbeddingService::new(
            "SECRET123".to_string(),
            None,
            Some("http://127.0.0.1:9/v1beta".to_string()),
            4,
        )
        .unwrap();

        let err = service.embed("hello").await.unwrap_err();
        assert!(matches!(err, TengenError::Embedding(_)));
        assert!(!err.to_string().contains("SECRET123"), "{}", err);
    }

    #[tokio::test]
    #[ignore] // Requires GOOGLE_API_KEY
    async fn test_embed_single_text() {
        let api_key = std::env::var("GOOGLE_API_KEY").expect("GOOGLE_API_KEY not set");
        let service =
            GeminiEmbeddingService::new(api_key, None, None, GEMINI_EMBEDDING_DIM).unwrap();

        let embedding = service.embed("Rust programming language").await.unwrap();
        assert_eq!(embedding.len(), GEMINI_EMBEDDING_DIM);
    }
}
