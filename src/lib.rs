//! Tengen - AI research assistant
//!
//! A chat-style assistant that combines Google Gemini inference, web
//! research and document Q&A behind a small HTTP API, plus a client library
//! for terminal front ends.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Messages, sessions, research results and request bodies
//! - **Services**: Gemini inference, code assist, research scraping
//! - **Embeddings / RAG**: Chunking, embedding and retrieval over uploaded documents
//! - **Storage**: sqlite-vec chunk index and chat session stores
//! - **API**: axum server exposing `/chat`, `/research`, `/code-assist`, `/files/upload`, `/health`
//! - **Client**: HTTP client and the chat controller state machine
//!
//! # Example
//!
//! ```ignore
//! use tengen_core::{ApiClient, ChatController, ChatMode, MemorySessionStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ApiClient::new("http://127.0.0.1:8000")?;
//!     let controller = ChatController::new(
//!         Arc::new(client),
//!         Arc::new(MemorySessionStore::default()),
//!         Default::default(),
//!     );
//!
//!     controller.send("What is quantum computing?", ChatMode::Auto).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod rag;
pub mod services;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, AppState};
pub use client::{ApiClient, ChatBackend, ChatController, ChatEvent, ChatState, Connectivity};
pub use config::TengenConfig;
pub use error::{Result, TengenError};
pub use services::{Assistant, GeminiService, LlmProvider};
pub use storage::{MemorySessionStore, SessionStore, SqliteSessionStore};
pub use types::{
    ChatMode, ChatSession, ChatTurn, Message, MessageKind, ResearchResult, ResearchStatus, Role,
    SessionId, SessionSummary, Source, UploadReceipt,
};
