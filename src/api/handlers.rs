//! Request handlers for the HTTP API

use super::state::AppState;
use crate::error::{Result, TengenError};
use crate::services::TextStream;
use crate::types::{
    ChatRequest, CodeRequest, CodeResponse, ComponentHealth, DebugRequest, DebugResponse,
    DetailedHealth, HealthStatus, ModelInfo, RagAnswer, RagQuery, ResearchRequest,
    ResearchResult, UploadReceipt,
};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Unwrap a JSON body, turning extractor rejections into validation errors
fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| TengenError::Validation(rejection.body_text()))
}

/// Relay a text stream as a chunked `text/plain` body
fn text_stream_response(stream: TextStream) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response()
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Tengen.ai Research Assistant API",
        "status": "running",
    }))
}

/// Health check handler
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
        qa_chain_ready: state.assistant.rag().is_ready(),
        google_api_configured: state.assistant.llm_configured(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: state.instance_id.clone(),
    })
}

/// Per-component status with uptime
pub async fn health_detailed(State(state): State<AppState>) -> Json<DetailedHealth> {
    let assistant = &state.assistant;

    let llm = if assistant.llm_configured() {
        ComponentHealth::new(true, format!("{} configured", state.model.model_name))
    } else {
        ComponentHealth::new(false, "GOOGLE_API_KEY not configured")
    };

    let chunks = assistant.rag().chunk_count();
    let document_index = if chunks > 0 {
        ComponentHealth::new(true, format!("{} chunks indexed", chunks))
    } else {
        ComponentHealth::new(true, "no documents indexed")
    };

    let data_dir = assistant.rag().data_dir();
    let data_dir = match tokio::fs::metadata(data_dir).await {
        Ok(meta) if meta.is_dir() => ComponentHealth::new(true, data_dir.display().to_string()),
        _ => ComponentHealth::new(false, format!("{} is not accessible", data_dir.display())),
    };

    let status = DetailedHealth::overall(&[&llm, &document_index, &data_dir]);
    Json(DetailedHealth {
        status: status.to_string(),
        timestamp: chrono::Utc::now(),
        uptime_secs: state.started_at.elapsed().as_secs_f64(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: state.instance_id.clone(),
        llm,
        document_index,
        data_dir,
    })
}

pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.model.as_ref().clone())
}

pub async fn health_live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

/// Ready only once an LLM key is configured
pub async fn health_ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.assistant.llm_configured() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready", "reason": "GOOGLE_API_KEY not configured" })),
        )
    }
}

/// Streamed chat reply; the body's `mode` picks the adapter
pub async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let request = body(payload)?;
    debug!(
        "Chat request with {} messages in {} mode",
        request.messages.len(),
        request.mode
    );
    let stream = state.assistant.chat(&request.messages, request.mode).await?;
    Ok(text_stream_response(stream))
}

/// Streamed code help; the path forces code mode
pub async fn code_assist(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let request = body(payload)?;
    let stream = state.assistant.code_assist(&request.messages).await?;
    Ok(text_stream_response(stream))
}

pub async fn research(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<Json<ResearchResult>> {
    let request = body(payload)?;
    let result = state
        .assistant
        .research(&request.topic, request.max_sources)
        .await?;
    Ok(Json(result))
}

pub async fn code_generate(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CodeRequest>, JsonRejection>,
) -> Result<Json<CodeResponse>> {
    let request = body(payload)?;
    let code = state.assistant.generate_code(&request.prompt).await?;
    Ok(Json(CodeResponse {
        code,
        code_type: request.code_type,
    }))
}

pub async fn code_debug(
    State(state): State<AppState>,
    payload: std::result::Result<Json<DebugRequest>, JsonRejection>,
) -> Result<Json<DebugResponse>> {
    let request = body(payload)?;
    let debug_result = state
        .assistant
        .debug_code(&request.code, &request.language)
        .await?;
    Ok(Json(DebugResponse {
        debug_result,
        language: request.language,
    }))
}

pub async fn rag_query(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RagQuery>, JsonRejection>,
) -> Result<Json<RagAnswer>> {
    let request = body(payload)?;
    Ok(Json(state.assistant.rag_query(&request.question).await?))
}

/// Multipart upload; the document goes in the `file` field
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TengenError::Validation(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| TengenError::Validation("No file selected".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| TengenError::Validation(e.body_text()))?;

        info!("Received upload {} ({} bytes)", file_name, bytes.len());
        let receipt = state.assistant.store_upload(&file_name, &bytes).await?;
        return Ok(Json(receipt));
    }

    Err(TengenError::Validation("No file uploaded".to_string()))
}
