//! Common test utilities: a fake Gemini endpoint, a fake website and a
//! backend wired to both, each on an ephemeral port.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tengen_core::{
    api::{build_router, ApiServerConfig, AppState},
    config::EmbeddingProvider,
    TengenConfig,
};
use tokio::net::TcpListener;

pub const GENERATED_TEXT: &str = "Generated answer.";
pub const STREAMED_PARTS: &[&str] = &["Streamed ", "answer."];

/// Serve a router on 127.0.0.1 with an OS-assigned port
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Bodies received by the fake Gemini endpoint
pub type Recorded = Arc<Mutex<Vec<Value>>>;

fn candidate(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
}

async fn gemini(
    State(recorded): State<Recorded>,
    Path(call): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    recorded.lock().unwrap().push(body);

    if call.ends_with(":streamGenerateContent") {
        let sse: String = STREAMED_PARTS
            .iter()
            .map(|part| format!("data: {}\r\n\r\n", candidate(part)))
            .collect();
        ([(header::CONTENT_TYPE, "text/event-stream")], Body::from(sse)).into_response()
    } else {
        Json(candidate(GENERATED_TEXT)).into_response()
    }
}

pub async fn spawn_fake_gemini() -> (SocketAddr, Recorded) {
    let recorded: Recorded = Arc::default();
    let router = Router::new()
        .route("/v1beta/models/:call", post(gemini))
        .with_state(recorded.clone());
    (spawn(router).await, recorded)
}

async fn wiki_page(Path(topic): Path<String>) -> Html<String> {
    let body = format!(
        "{} is a field of study. Researchers have written extensively about {} \
         and its applications in computing, physics and cryptography.",
        topic, topic
    );
    Html(format!(
        "<html><head><title>{} - Wiki</title><script>tracking()</script></head>\
         <body><nav>Menu</nav><main><p>{}</p></main></body></html>",
        topic, body
    ))
}

pub async fn spawn_fake_site() -> SocketAddr {
    spawn(Router::new().route("/wiki/:topic", get(wiki_page))).await
}

/// A running backend plus its fakes and scratch directory
pub struct TestBackend {
    pub addr: SocketAddr,
    pub config: TengenConfig,
    pub gemini: Recorded,
    pub dir: TempDir,
}

impl TestBackend {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn gemini_calls(&self) -> usize {
        self.gemini.lock().unwrap().len()
    }

    pub fn last_gemini_body(&self) -> Value {
        self.gemini.lock().unwrap().last().cloned().unwrap_or(Value::Null)
    }
}

pub async fn spawn_backend() -> TestBackend {
    let dir = TempDir::new().unwrap();
    let (gemini_addr, gemini) = spawn_fake_gemini().await;
    let site_addr = spawn_fake_site().await;

    let mut config = TengenConfig::default();
    config.server.data_dir = dir.path().join("data");
    config.server.db_path = dir.path().join("index.db");
    config.llm.api_key = "test-key".to_string();
    config.llm.base_url = format!("http://{}/v1beta", gemini_addr);
    config.embeddings.provider = EmbeddingProvider::Local;
    config.embeddings.dimensions = 64;
    config.research.sources = vec![format!("http://{}/wiki/{{topic_underscore}}", site_addr)];
    config.research.delay_ms = 0;
    config.research.timeout_secs = 5;
    config.client.session_db = dir.path().join("sessions.db");

    let state = AppState::from_config(&config).await.unwrap();
    let addr = spawn(build_router(state, &ApiServerConfig::default())).await;
    config.client.api_url = format!("http://{}", addr);

    TestBackend {
        addr,
        config,
        gemini,
        dir,
    }
}
