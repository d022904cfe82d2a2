//! Request dispatch behind the HTTP surface
//!
//! Each request is routed by its resolved [`ChatMode`] to exactly one
//! adapter: inference, code assist, research or document Q&A.

use crate::error::{Result, TengenError};
use crate::rag::{RagPipeline, INDEXABLE_EXTENSIONS};
use crate::services::code_assist::CodeAssistService;
use crate::services::llm::{GenerationRequest, LlmProvider, TextStream};
use crate::services::research::ResearchService;
use crate::types::{
    extract_topic, ChatMode, ChatTurn, RagAnswer, ResearchResult, ResearchStatus, Role, Source,
    UploadReceipt,
};
use crate::utils::string::{sanitize_filename, take_chars, truncate_at_char_boundary};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SUMMARY_EXCERPT_CHARS: usize = 500;
const FALLBACK_SUMMARY_CHARS: usize = 1000;
const SOURCE_SUMMARY_CHARS: usize = 200;

/// Backend request handler
pub struct Assistant {
    llm: Arc<dyn LlmProvider>,
    code: CodeAssistService,
    research: ResearchService,
    rag: Arc<RagPipeline>,
    chat_max_sources: usize,
}

impl Assistant {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        research: ResearchService,
        rag: Arc<RagPipeline>,
        chat_max_sources: usize,
    ) -> Self {
        Self {
            code: CodeAssistService::new(Arc::clone(&llm)),
            llm,
            research,
            rag,
            chat_max_sources,
        }
    }

    pub fn rag(&self) -> &RagPipeline {
        &self.rag
    }

    pub fn llm_configured(&self) -> bool {
        self.llm.is_configured()
    }

    /// Stream a reply to the latest user turn
    pub async fn chat(&self, turns: &[ChatTurn], mode: ChatMode) -> Result<TextStream> {
        let prompt = latest_prompt(turns)?;
        let mode = mode.resolve(prompt);
        debug!("Dispatching chat request in {} mode", mode);

        match mode {
            ChatMode::Code => self.code.stream_code(prompt).await,
            ChatMode::Research => {
                let topic = extract_topic(prompt);
                let topic = if topic.is_empty() { prompt } else { topic.as_str() };

                info!("Auto-researching topic: {}", topic);
                let outcome = self.research.scrape_topic(topic, self.chat_max_sources).await?;
                if outcome.succeeded() {
                    if let Err(e) = self.rag.rebuild().await {
                        warn!("Index rebuild after research failed: {}", e);
                    }
                }
                self.answer(turns, prompt).await
            }
            ChatMode::Chat | ChatMode::Auto => self.answer(turns, prompt).await,
        }
    }

    /// Document-grounded answer when documents exist, plain completion otherwise
    async fn answer(&self, turns: &[ChatTurn], prompt: &str) -> Result<TextStream> {
        if self.rag.is_ready() {
            self.rag.stream_query(prompt).await
        } else {
            self.llm
                .stream(&GenerationRequest::from_turns(turns.to_vec()))
                .await
        }
    }

    /// Research a topic and summarise the findings
    pub async fn research(&self, topic: &str, max_sources: usize) -> Result<ResearchResult> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TengenError::Validation("Topic cannot be empty".to_string()));
        }
        if max_sources == 0 {
            return Err(TengenError::Validation(
                "max_sources must be at least 1".to_string(),
            ));
        }

        let outcome = self.research.scrape_topic(topic, max_sources).await?;
        if !outcome.succeeded() {
            return Ok(ResearchResult::failed(topic, "No successful scraping results"));
        }

        let summary = outcome
            .usable
            .iter()
            .map(|page| take_chars(&page.content, SUMMARY_EXCERPT_CHARS))
            .collect::<Vec<_>>()
            .join("\n");

        let message = match self.summarise(topic, &summary).await {
            Ok(message) => message,
            Err(e) => {
                warn!("Research summary generation failed: {}", e);
                format!(
                    "Based on my research about {}, here's what I found:\n\n{}...",
                    topic,
                    take_chars(&summary, FALLBACK_SUMMARY_CHARS)
                )
            }
        };

        let sources: Vec<Source> = outcome
            .usable
            .iter()
            .map(|page| Source {
                title: page.title.clone(),
                summary: truncate_at_char_boundary(&page.content, SOURCE_SUMMARY_CHARS),
                url: page.url.clone(),
            })
            .collect();

        Ok(ResearchResult {
            topic: topic.to_string(),
            status: ResearchStatus::Completed,
            message,
            results_count: sources.len(),
            sources,
        })
    }

    async fn summarise(&self, topic: &str, summary: &str) -> Result<String> {
        self.rag.rebuild().await?;
        if !self.rag.is_ready() {
            return Err(TengenError::Other("No documents indexed".to_string()));
        }

        let answer = self
            .rag
            .query(&format!(
                "Based on the research about {}, provide a comprehensive and conversational \
                 explanation. Here's the research data: {}",
                topic, summary
            ))
            .await?;
        Ok(answer.answer)
    }

    /// Stream code-assist output for the latest user turn
    pub async fn code_assist(&self, turns: &[ChatTurn]) -> Result<TextStream> {
        self.code.stream_code(latest_prompt(turns)?).await
    }

    pub async fn generate_code(&self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(TengenError::Validation("Prompt cannot be empty".to_string()));
        }
        self.code.generate_code(prompt).await
    }

    pub async fn debug_code(&self, code: &str, language: &str) -> Result<String> {
        if code.trim().is_empty() {
            return Err(TengenError::Validation("Code cannot be empty".to_string()));
        }
        self.code.debug_code(code, language).await
    }

    pub async fn rag_query(&self, question: &str) -> Result<RagAnswer> {
        if question.trim().is_empty() {
            return Err(TengenError::Validation("Question cannot be empty".to_string()));
        }
        self.rag.query(question).await
    }

    /// Save an uploaded document and re-index the data directory
    pub async fn store_upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadReceipt> {
        let name = sanitize_filename(file_name);
        let ext = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if !INDEXABLE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(TengenError::UnsupportedFileType(format!(
                "{} (accepted: {})",
                file_name,
                INDEXABLE_EXTENSIONS.join(", ")
            )));
        }

        let data_dir = self.rag.data_dir();
        tokio::fs::create_dir_all(data_dir).await?;
        tokio::fs::write(data_dir.join(&name), bytes).await?;
        info!("Stored upload {} ({} bytes)", name, bytes.len());

        let (status, message) = match self.rag.rebuild().await {
            Ok(count) => (
                "processed",
                format!("File uploaded and processed for research ({} chunks indexed)", count),
            ),
            Err(e) => {
                warn!("Indexing after upload failed: {}", e);
                ("uploaded", format!("File uploaded but processing failed: {}", e))
            }
        };

        Ok(UploadReceipt {
            url: format!("/files/{}", name),
            content_type: mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
            pathname: name,
            size: bytes.len(),
            status: status.to_string(),
            message: Some(message),
        })
    }
}

/// Content of the final user turn
fn latest_prompt(turns: &[ChatTurn]) -> Result<&str> {
    let last = turns
        .last()
        .ok_or_else(|| TengenError::Validation("messages cannot be empty".to_string()))?;

    if last.role != Role::User {
        return Err(TengenError::Validation(
            "the last message must come from the user".to_string(),
        ));
    }
    if last.content.trim().is_empty() {
        return Err(TengenError::Validation(
            "message content cannot be empty".to_string(),
        ));
    }
    Ok(&last.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RagSettings, ResearchSettings};
    use crate::embeddings::HashingEmbeddingService;
    use crate::services::llm::MockLlmProvider;
    use futures::{stream, StreamExt};
    use tempfile::TempDir;

    async fn assistant(dir: &TempDir, llm: MockLlmProvider) -> Assistant {
        let llm: Arc<dyn LlmProvider> = Arc::new(llm);
        let data_dir = dir.path().join("data");
        let rag = RagPipeline::new(
            &data_dir,
            &dir.path().join("index.db"),
            Arc::new(HashingEmbeddingService::new(32)),
            Arc::clone(&llm),
            RagSettings::default(),
        )
        .await
        .unwrap();
        let research = ResearchService::new(
            ResearchSettings {
                sources: vec!["http://127.0.0.1:9/{topic_underscore}".to_string()],
                delay_ms: 0,
                timeout_secs: 2,
                ..ResearchSettings::default()
            },
            &data_dir,
        )
        .unwrap();
        Assistant::new(llm, research, Arc::new(rag), 3)
    }

    fn chunks(parts: &[&str]) -> TextStream {
        let items: Vec<Result<String>> = parts.iter().map(|p| Ok(p.to_string())).collect();
        Box::pin(stream::iter(items))
    }

    #[test]
    fn test_latest_prompt_validation() {
        assert!(latest_prompt(&[]).is_err());
        assert!(latest_prompt(&[ChatTurn::user("   ")]).is_err());
        let assistant_last = [ChatTurn {
            role: Role::Assistant,
            content: "hi".to_string(),
        }];
        assert!(latest_prompt(&assistant_last).is_err());
        assert_eq!(latest_prompt(&[ChatTurn::user("hello")]).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_chat_mode_uses_plain_completion_without_documents() {
        let dir = TempDir::new().unwrap();
        let mut llm = MockLlmProvider::new();
        llm.expect_stream()
            .withf(|req| req.turns.len() == 2 && req.turns[1].content == "and now?")
            .times(1)
            .returning(|_| Ok(chunks(&["Hel", "lo"])));

        let assistant = assistant(&dir, llm).await;
        let turns = vec![
            ChatTurn::user("hi"),
            ChatTurn::user("and now?"),
        ];
        let text: Vec<String> = assistant
            .chat(&turns, ChatMode::Chat)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(text.concat(), "Hello");
    }

    #[tokio::test]
    async fn test_code_mode_wraps_prompt() {
        let dir = TempDir::new().unwrap();
        let mut llm = MockLlmProvider::new();
        llm.expect_stream()
            .withf(|req| req.turns[0].content.starts_with("You are an expert programmer."))
            .times(1)
            .returning(|_| Ok(chunks(&["fn main() {}"])));

        let assistant = assistant(&dir, llm).await;
        let stream = assistant
            .code_assist(&[ChatTurn::user("write a function")])
            .await
            .unwrap();
        let text: Vec<Result<String>> = stream.collect().await;
        assert_eq!(text.len(), 1);
    }

    #[tokio::test]
    async fn test_research_failure_message() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant(&dir, MockLlmProvider::new()).await;

        let result = assistant.research("quantum computing", 2).await.unwrap();
        assert_eq!(result.status, ResearchStatus::Failed);
        assert_eq!(
            result.message,
            "I couldn't research quantum computing right now. No successful scraping results"
        );
        assert!(result.sources.is_empty());

        assert!(matches!(
            assistant.research("  ", 2).await,
            Err(TengenError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_store_upload_indexes_json() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant(&dir, MockLlmProvider::new()).await;

        let receipt = assistant
            .store_upload("../notes.json", br#"{"content": "entanglement notes"}"#)
            .await
            .unwrap();
        assert_eq!(receipt.pathname, "notes.json");
        assert_eq!(receipt.url, "/files/notes.json");
        assert_eq!(receipt.content_type, "application/json");
        assert_eq!(receipt.status, "processed");
        assert!(dir.path().join("data/notes.json").exists());
        assert!(assistant.rag().is_ready());

        let err = assistant.store_upload("photo.png", b"\x89PNG").await.unwrap_err();
        assert!(matches!(err, TengenError::UnsupportedFileType(_)));
    }
}
