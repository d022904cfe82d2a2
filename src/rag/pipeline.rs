//! Retrieval-augmented question answering over the data directory

use super::loader::load_documents;
use super::splitter::TextSplitter;
use crate::config::RagSettings;
use crate::embeddings::EmbeddingService;
use crate::error::Result;
use crate::services::llm::{GenerationRequest, LlmProvider, TextStream};
use crate::storage::{IndexedChunk, ScoredChunk, SqliteVectorIndex};
use crate::types::RagAnswer;
use crate::utils::string::truncate_at_char_boundary;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Answer given when nothing has been indexed
pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents available for querying. Please upload research documents first.";

const SOURCE_PREVIEW_CHARS: usize = 200;

/// Document store plus the retrieval QA chain
pub struct RagPipeline {
    data_dir: PathBuf,
    index: RwLock<SqliteVectorIndex>,
    chunk_count: AtomicUsize,
    embedder: Arc<dyn EmbeddingService>,
    llm: Arc<dyn LlmProvider>,
    splitter: TextSplitter,
    settings: RagSettings,
}

impl RagPipeline {
    /// Open the index at `db_path`; call [`rebuild`](Self::rebuild) to load documents
    pub async fn new(
        data_dir: impl Into<PathBuf>,
        db_path: &Path,
        embedder: Arc<dyn EmbeddingService>,
        llm: Arc<dyn LlmProvider>,
        settings: RagSettings,
    ) -> Result<Self> {
        let index = SqliteVectorIndex::new(db_path, embedder.dimensions()).await?;
        let existing = index.count().await?;

        Ok(Self {
            data_dir: data_dir.into(),
            index: RwLock::new(index),
            chunk_count: AtomicUsize::new(existing),
            embedder,
            llm,
            splitter: TextSplitter::new(settings.chunk_size, settings.chunk_overlap),
            settings,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Whether the index holds any chunks
    pub fn is_ready(&self) -> bool {
        self.chunk_count.load(Ordering::SeqCst) > 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count.load(Ordering::SeqCst)
    }

    /// Reload, split, embed and index every document in the data directory
    pub async fn rebuild(&self) -> Result<usize> {
        let index = self.index.write().await;

        let documents = load_documents(&self.data_dir).await?;
        let mut pending: Vec<(String, String)> = Vec::new();
        for doc in &documents {
            for chunk in self.splitter.split(&doc.text) {
                pending.push((doc.source.clone(), chunk));
            }
        }

        debug!(
            "Split {} documents into {} chunks",
            documents.len(),
            pending.len()
        );

        let texts: Vec<&str> = pending.iter().map(|(_, c)| c.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let chunks = pending
            .into_iter()
            .zip(embeddings)
            .map(|((source, content), embedding)| IndexedChunk {
                source,
                content,
                embedding,
            })
            .collect();

        let count = index.replace_all(chunks).await?;
        self.chunk_count.store(count, Ordering::SeqCst);
        info!("Vector store created with {} chunks", count);
        Ok(count)
    }

    /// Top-k chunks for a question
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let index = self.index.read().await;
        let query = self.embedder.embed(question).await?;
        index.search(&query, self.settings.top_k).await
    }

    /// Stuff retrieved chunks into a single prompt
    pub fn build_request(&self, question: &str, chunks: &[ScoredChunk]) -> GenerationRequest {
        let context = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Use the following pieces of context to answer the question at the end. \
             If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
             {}\n\nQuestion: {}\nHelpful Answer:",
            context, question
        );

        GenerationRequest::prompt(prompt).with_temperature(self.settings.temperature)
    }

    /// Answer a question from the indexed documents
    pub async fn query(&self, question: &str) -> Result<RagAnswer> {
        if !self.is_ready() {
            return Ok(RagAnswer {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let chunks = self.retrieve(question).await?;
        let answer = self.llm.generate(&self.build_request(question, &chunks)).await?;

        Ok(RagAnswer {
            answer,
            sources: chunks
                .iter()
                .map(|c| source_preview(&c.content))
                .collect(),
        })
    }

    /// Streamed variant of [`query`](Self::query) used by `/chat`
    pub async fn stream_query(&self, question: &str) -> Result<TextStream> {
        let chunks = self.retrieve(question).await?;
        self.llm.stream(&self.build_request(question, &chunks)).await
    }
}

/// First 200 characters of a chunk followed by `...`
pub fn source_preview(content: &str) -> String {
    let mut preview = truncate_at_char_boundary(content, SOURCE_PREVIEW_CHARS);
    if !preview.ends_with("...") {
        preview.push_str("...");
    }
    preview
}
