//! Shared state handed to every request handler

use crate::config::TengenConfig;
use crate::embeddings;
use crate::error::Result;
use crate::rag::RagPipeline;
use crate::services::{Assistant, GeminiService, LlmConfig, LlmProvider, ResearchService};
use crate::types::ModelInfo;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// API server state
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    /// Served by `GET /model/info`
    pub model: Arc<ModelInfo>,
    /// Instance ID
    pub instance_id: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(assistant: Arc<Assistant>, model: ModelInfo) -> Self {
        Self {
            assistant,
            model: Arc::new(model),
            instance_id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            started_at: Instant::now(),
        }
    }

    /// Wire up Gemini, embeddings, the index and the scraper from configuration
    pub async fn from_config(config: &TengenConfig) -> Result<Self> {
        let llm: Arc<dyn LlmProvider> = Arc::new(GeminiService::new(LlmConfig::from(&config.llm))?);
        Self::with_llm(config, llm).await
    }

    /// Same as [`from_config`](Self::from_config) with a caller-supplied LLM
    pub async fn with_llm(config: &TengenConfig, llm: Arc<dyn LlmProvider>) -> Result<Self> {
        if !llm.is_configured() {
            warn!("GOOGLE_API_KEY not set; generation requests will fail");
        }

        let embedder = embeddings::from_config(config)?;
        let rag = Arc::new(
            RagPipeline::new(
                &config.server.data_dir,
                &config.server.db_path,
                embedder,
                Arc::clone(&llm),
                config.rag.clone(),
            )
            .await?,
        );

        match rag.rebuild().await {
            Ok(0) => info!("No documents found in data directory"),
            Ok(count) => info!("QA chain initialized with {} chunks", count),
            Err(e) => warn!("Error initializing document index: {}", e),
        }

        let model = ModelInfo {
            model_name: config.llm.model.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            loaded: llm.is_configured(),
            capabilities: ["text_generation", "code_generation", "debugging", "research"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            max_tokens: config.llm.max_output_tokens,
            temperature: config.llm.temperature,
        };

        let research = ResearchService::new(config.research.clone(), &config.server.data_dir)?;
        let assistant = Assistant::new(llm, research, rag, config.research.chat_max_sources);

        Ok(Self::new(Arc::new(assistant), model))
    }
}
