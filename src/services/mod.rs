//! Services layer for Tengen
//!
//! Provides LLM inference, code assist, web research and the dispatcher that
//! routes backend requests between them.

pub mod assistant;
pub mod code_assist;
pub mod llm;
pub mod research;

pub use assistant::Assistant;
pub use code_assist::CodeAssistService;
pub use llm::{GeminiService, GenerationRequest, LlmConfig, LlmProvider, TextStream};
pub use research::{ResearchService, ScrapeOutcome, ScrapedPage};
