//! Inference adapter for Google Gemini
//!
//! Provides:
//! - Single-shot completions (`models/{model}:generateContent`)
//! - Streamed completions over SSE (`:streamGenerateContent?alt=sse`)
//!
//! No retry, backoff or caching happens here; failures surface as
//! `TengenError::Upstream`.

use crate::config::LlmSettings;
use crate::error::{Result, TengenError};
use crate::types::{ChatTurn, Role};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Incrementally delivered response text
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Header carrying the API key, kept out of URLs so it never shows up in errors
pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";

/// A prompt ready for inference
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationRequest {
    pub turns: Vec<ChatTurn>,
    pub system_instruction: Option<String>,
    /// Overrides the service default when set
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Single user prompt
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            turns: vec![ChatTurn::user(text)],
            ..Default::default()
        }
    }

    /// Full conversation history
    pub fn from_turns(turns: Vec<ChatTurn>) -> Self {
        Self {
            turns,
            ..Default::default()
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Text generation backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a complete response
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Generate a response as a stream of text chunks
    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream>;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    fn model_name(&self) -> String;
}

/// Configuration for the Gemini service
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,

    /// Model to use (default: gemini-2.5-flash)
    pub model: String,

    pub temperature: f32,

    pub max_output_tokens: u32,

    /// API root, e.g. `https://generativelanguage.googleapis.com/v1beta`
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::from(&LlmSettings::default())
    }
}

impl From<&LlmSettings> for LlmConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Gemini REST client
pub struct GeminiService {
    config: LlmConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

impl GeminiService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn endpoint(&self, method: &str) -> String {
        let mut url = format!(
            "{}/models/{}:{}",
            self.config.base_url, self.config.model, method
        );
        if method == "streamGenerateContent" {
            url.push_str("?alt=sse");
        }
        url
    }

    fn build_body(&self, request: &GenerationRequest) -> GenerateContentRequest {
        let contents = request
            .turns
            .iter()
            .map(|turn| Content {
                role: Some(
                    match turn.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: turn.content.clone(),
                }],
            })
            .collect();

        let system_instruction = request.system_instruction.as_ref().map(|text| Content {
            role: None,
            parts: vec![Part { text: text.clone() }],
        });

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(self.config.temperature),
                max_output_tokens: request
                    .max_output_tokens
                    .unwrap_or(self.config.max_output_tokens),
            },
        }
    }

    async fn send(&self, method: &str, request: &GenerationRequest) -> Result<reqwest::Response> {
        if !self.is_configured() {
            return Err(TengenError::Upstream(
                "GOOGLE_API_KEY is not configured".to_string(),
            ));
        }
        if request.turns.is_empty() {
            return Err(TengenError::Validation(
                "Generation request has no messages".to_string(),
            ));
        }

        debug!("Calling Gemini {} ({})", method, self.config.model);

        let response = self
            .client
            .post(self.endpoint(method))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| {
                TengenError::Upstream(format!("Gemini API request failed: {}", e.without_url()))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini API returned {}", status);
            return Err(TengenError::Upstream(map_http_error(status.as_u16(), &body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for GeminiService {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let response = self.send("generateContent", request).await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| {
                TengenError::Upstream(format!(
                    "Failed to parse Gemini response: {}",
                    e.without_url()
                ))
            })?;

        extract_text(parsed).ok_or_else(|| {
            TengenError::Upstream("Gemini API returned no text in the response candidates".into())
        })
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream> {
        let response = self.send("streamGenerateContent", request).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => parse_stream_chunk(&event.data).transpose(),
                    Err(e) => Some(Err(TengenError::Upstream(format!(
                        "SSE stream error: {}",
                        e
                    )))),
                }
            });

        Ok(Box::pin(stream))
    }

    fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn model_name(&self) -> String {
        self.config.model.clone()
    }
}

fn extract_text(response: GenerateContentResponse) -> Option<String> {
    let text: String = response
        .candidates?
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Decode one SSE `data:` payload; empty chunks yield `None`
fn parse_stream_chunk(data: &str) -> Result<Option<String>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    if let Ok(wrapper) = serde_json::from_str::<ErrorWrapper>(data) {
        return Err(TengenError::Upstream(describe_error(wrapper.error, data)));
    }

    let chunk: GenerateContentResponse = serde_json::from_str(data)
        .map_err(|e| TengenError::Upstream(format!("SSE parsing error: {}, data: {}", e, data)))?;

    Ok(extract_text(chunk))
}

fn describe_error(error: ErrorBody, raw: &str) -> String {
    let status = error.status.unwrap_or_default();
    let message = error.message.unwrap_or_else(|| raw.to_string());
    if status.is_empty() {
        message
    } else {
        format!("{}: {}", status, message)
    }
}

fn map_http_error(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| describe_error(wrapper.error, body))
        .unwrap_or_else(|_| body.to_string());
    format!("Gemini API request failed with status {}: {}", status, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> GeminiService {
        GeminiService::new(LlmConfig {
            api_key: "k".to_string(),
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let request = GenerationRequest::from_turns(vec![
            ChatTurn::user("hi"),
            ChatTurn {
                role: Role::Assistant,
                content: "hello".to_string(),
            },
        ])
        .with_system_instruction("be brief")
        .with_temperature(0.3);

        let body = serde_json::to_value(service().build_body(&request)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "hello");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(body["systemInstruction"].get("role").is_none());
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_endpoints() {
        let svc = service();
        assert_eq!(
            svc.endpoint("generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert!(svc.endpoint("streamGenerateContent").ends_with(":streamGenerateContent?alt=sse"));
        assert!(!svc.endpoint("generateContent").contains("key="));
    }

    #[test]
    fn test_parse_stream_chunk() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"}}]}"#;
        assert_eq!(parse_stream_chunk(data).unwrap(), Some("Hello".to_string()));

        let finish = r#"{"candidates":[{"content":{"parts":[],"role":"model"},"finishReason":"STOP"}]}"#;
        assert_eq!(parse_stream_chunk(finish).unwrap(), None);

        let err = r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#;
        let e = parse_stream_chunk(err).unwrap_err();
        assert!(e.to_string().contains("RESOURCE_EXHAUSTED: quota"));

        assert!(parse_stream_chunk("not json").is_err());
    }

    #[test]
    fn test_map_http_error() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            map_http_error(400, body),
            "Gemini API request failed with status 400: INVALID_ARGUMENT: API key not valid"
        );
        assert_eq!(
            map_http_error(503, "overloaded"),
            "Gemini API request failed with status 503: overloaded"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_service_fails_fast() {
        let svc = GeminiService::new(LlmConfig::default()).unwrap();
        assert!(!svc.is_configured());
        let err = svc.generate(&GenerationRequest::prompt("hi")).await.unwrap_err();
        assert!(matches!(err, TengenError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_transport_error_hides_api_key() {
        let svc = GeminiService::new(LlmConfig {
            api_key: "SECRET123".to_string(),
            base_url: "http://127.0.0.1:9/v1beta".to_string(),
            ..LlmConfig::default()
        })
        .unwrap();

        let err = svc.generate(&GenerationRequest::prompt("hi")).await.unwrap_err();
        assert!(matches!(err, TengenError::Upstream(_)));
        assert!(!err.to_string().contains("SECRET123"), "{}", err);

        let response = axum::response::IntoResponse::into_response(err);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!String::from_utf8_lossy(&body).contains("SECRET123"));
    }

    #[tokio::test]
    #[ignore] // Requires GOOGLE_API_KEY
    async fn test_live_generate() {
        let svc = GeminiService::new(LlmConfig {
            api_key: std::env::var("GOOGLE_API_KEY").unwrap(),
            ..LlmConfig::default()
        })
        .unwrap();
        let text = svc
            .generate(&GenerationRequest::prompt("Say hello in one word."))
            .await
            .unwrap();
        assert!(!text.is_empty());
    }
}
