//! Core data types for the Tengen research assistant
//!
//! This module defines the conversation model shared by the backend and the
//! client: messages, chat sessions, research results, uploads and the wire
//! shapes of the HTTP API.

use crate::utils::string::truncate_at_char_boundary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum characters of the first user message kept as a session title
pub const SESSION_TITLE_CHARS: usize = 50;

/// Maximum characters kept in a session's last-message preview
pub const SESSION_PREVIEW_CHARS: usize = 100;

/// Unique identifier for chat sessions
///
/// Wraps a UUID to provide type safety and prevent mixing session IDs
/// with message IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Rendering hint attached to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Code,
    Research,
}

/// A single conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, kind: Option<MessageKind>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn user(content: impl Into<String>, kind: MessageKind) -> Self {
        Self::new(Role::User, content, Some(kind))
    }

    pub fn assistant(content: impl Into<String>, kind: MessageKind) -> Self {
        Self::new(Role::Assistant, content, Some(kind))
    }

    /// Append a streamed chunk to the content
    pub fn append(&mut self, chunk: &str) {
        self.content.push_str(chunk);
    }

    /// Wire form sent to the backend
    pub fn to_turn(&self) -> ChatTurn {
        ChatTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Role/content pair as carried by the `/chat` and `/code-assist` bodies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Explicit request mode chosen by the caller
///
/// `Auto` keeps the legacy keyword heuristic available, but only when the
/// caller asks for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Chat,
    Code,
    Research,
    Auto,
}

const RESEARCH_KEYWORDS: &[&str] = &[
    "what is",
    "tell me about",
    "explain",
    "research",
    "find information",
    "learn about",
];

const CODE_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "program",
    "script",
    "debug",
    "algorithm",
    "class",
    "method",
];

impl ChatMode {
    /// Resolve `Auto` against the prompt; other modes are returned unchanged.
    pub fn resolve(self, prompt: &str) -> ChatMode {
        match self {
            ChatMode::Auto => classify_prompt(prompt),
            other => other,
        }
    }

    /// Message type recorded for exchanges in this mode
    pub fn message_kind(self) -> MessageKind {
        match self {
            ChatMode::Code => MessageKind::Code,
            ChatMode::Research => MessageKind::Research,
            ChatMode::Chat | ChatMode::Auto => MessageKind::Text,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" | "text" => Some(ChatMode::Chat),
            "code" => Some(ChatMode::Code),
            "research" => Some(ChatMode::Research),
            "auto" => Some(ChatMode::Auto),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChatMode::Chat => "chat",
            ChatMode::Code => "code",
            ChatMode::Research => "research",
            ChatMode::Auto => "auto",
        };
        write!(f, "{}", s)
    }
}

/// Keyword classifier behind `ChatMode::Auto`
///
/// Research phrasing wins over code keywords ("explain this function" is a
/// research question).
pub fn classify_prompt(prompt: &str) -> ChatMode {
    let lower = prompt.to_lowercase();
    if RESEARCH_KEYWORDS.iter().any(|k| lower.contains(k)) {
        ChatMode::Research
    } else if looks_like_code(&lower) {
        ChatMode::Code
    } else {
        ChatMode::Chat
    }
}

/// Whether a prompt mentions a coding keyword
pub fn looks_like_code(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    CODE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Strip the research phrasing from a prompt to get the topic to scrape
pub fn extract_topic(prompt: &str) -> String {
    let mut topic = prompt.trim().to_string();
    for phrase in ["what is", "tell me about", "explain", "learn about"] {
        let found = topic.to_ascii_lowercase().find(phrase);
        if let Some(pos) = found {
            topic.replace_range(pos..pos + phrase.len(), "");
        }
    }
    topic
        .trim_matches(|c: char| c.is_whitespace() || c == '?' || c == '.' || c == '!')
        .to_string()
}

/// A persisted conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: SessionId,
    pub title: String,
    pub last_message_preview: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            title: String::new(),
            last_message_preview: String::new(),
            timestamp: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Append a message; ordering is append-only
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    /// Recompute title, preview and timestamp from the messages
    pub fn touch(&mut self) {
        if let Some(first_user) = self.messages.iter().find(|m| m.role == Role::User) {
            self.title = truncate_at_char_boundary(first_user.content.trim(), SESSION_TITLE_CHARS);
        }
        if let Some(last) = self.messages.last() {
            self.last_message_preview =
                truncate_at_char_boundary(last.content.trim(), SESSION_PREVIEW_CHARS);
        }
        self.timestamp = Utc::now();
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            title: self.title.clone(),
            last_message_preview: self.last_message_preview.clone(),
            timestamp: self.timestamp,
            message_count: self.messages.len(),
        }
    }

    pub fn turns(&self) -> Vec<ChatTurn> {
        self.messages.iter().map(Message::to_turn).collect()
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Listing entry for stored sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub last_message_preview: String,
    pub timestamp: DateTime<Utc>,
    pub message_count: usize,
}

/// Outcome of a research request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Completed,
    Failed,
}

/// One scraped source backing a research answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub summary: String,
    pub url: String,
}

/// Result of researching a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub topic: String,
    pub status: ResearchStatus,
    pub message: String,
    #[serde(default)]
    pub results_count: usize,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl ResearchResult {
    pub fn failed(topic: impl Into<String>, reason: &str) -> Self {
        let topic = topic.into();
        Self {
            message: format!("I couldn't research {} right now. {}", topic, reason),
            topic,
            status: ResearchStatus::Failed,
            results_count: 0,
            sources: Vec::new(),
        }
    }

    /// Render as markdown for display inside a conversation
    pub fn to_markdown(&self) -> String {
        let mut out = self.message.clone();
        if !self.sources.is_empty() {
            out.push_str("\n\nSources:\n");
            for (i, source) in self.sources.iter().enumerate() {
                out.push_str(&format!("{}. {} - {}\n", i + 1, source.title, source.url));
            }
        }
        out
    }
}

/// Response of `POST /files/upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub url: String,
    pub pathname: String,
    pub content_type: String,
    pub size: usize,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `POST /chat` and `POST /code-assist`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub mode: ChatMode,
}

/// Default number of pages scraped per research request
pub const DEFAULT_MAX_SOURCES: usize = 5;

fn default_max_sources() -> usize {
    DEFAULT_MAX_SOURCES
}

/// Body of `POST /research`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default = "default_max_sources", alias = "max_results")]
    pub max_sources: usize,
}

fn default_code_type() -> String {
    "general".to_string()
}

fn default_language() -> String {
    "python".to_string()
}

/// Body of `POST /code/generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRequest {
    pub prompt: String,
    #[serde(default = "default_code_type")]
    pub code_type: String,
}

/// Response of `POST /code/generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeResponse {
    pub code: String,
    #[serde(rename = "type")]
    pub code_type: String,
}

/// Body of `POST /code/debug`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugRequest {
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
}

/// Response of `POST /code/debug`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugResponse {
    pub debug_result: String,
    pub language: String,
}

/// Body of `POST /rag/query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagQuery {
    pub question: String,
}

/// Answer produced by the document Q&A flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

/// Response of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub qa_chain_ready: bool,
    pub google_api_configured: bool,
    pub version: String,
    #[serde(default)]
    pub instance_id: String,
}

/// One dependency's entry in `GET /health/detailed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    pub detail: String,
}

impl ComponentHealth {
    pub fn new(healthy: bool, detail: impl Into<String>) -> Self {
        Self {
            healthy,
            detail: detail.into(),
        }
    }
}

/// Response of `GET /health/detailed`
///
/// `status` is `healthy` when every component is, `degraded` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealth {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: f64,
    pub version: String,
    pub instance_id: String,
    pub llm: ComponentHealth,
    pub document_index: ComponentHealth,
    pub data_dir: ComponentHealth,
}

impl DetailedHealth {
    pub fn overall(components: &[&ComponentHealth]) -> &'static str {
        if components.iter().all(|c| c.healthy) {
            "healthy"
        } else {
            "degraded"
        }
    }
}

/// Response of `GET /model/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub version: String,
    pub loaded: bool,
    pub capabilities: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prompt() {
        assert_eq!(classify_prompt("What is quantum computing?"), ChatMode::Research);
        assert_eq!(classify_prompt("Tell me about Rust"), ChatMode::Research);
        assert_eq!(classify_prompt("write a function that sorts"), ChatMode::Code);
        assert_eq!(classify_prompt("good morning"), ChatMode::Chat);
        // research phrasing wins
        assert_eq!(classify_prompt("explain this function"), ChatMode::Research);
    }

    #[test]
    fn test_mode_resolution_is_explicit() {
        let prompt = "What is quantum computing?";
        assert_eq!(ChatMode::Chat.resolve(prompt), ChatMode::Chat);
        assert_eq!(ChatMode::Code.resolve(prompt), ChatMode::Code);
        assert_eq!(ChatMode::Auto.resolve(prompt), ChatMode::Research);
        assert_eq!(ChatMode::Research.message_kind(), MessageKind::Research);
    }

    #[test]
    fn test_extract_topic() {
        assert_eq!(extract_topic("What is quantum computing?"), "quantum computing");
        assert_eq!(extract_topic("tell me about the Roman empire"), "the Roman empire");
        assert_eq!(extract_topic("black holes"), "black holes");
    }

    #[test]
    fn test_session_summary_fields() {
        let mut session = ChatSession::new();
        session.push(Message::user("What is quantum computing?", MessageKind::Research));
        session.push(Message::assistant("x".repeat(150), MessageKind::Research));

        assert_eq!(session.title, "What is quantum computing?");
        assert_eq!(session.last_message_preview, format!("{}...", "x".repeat(100)));

        let summary = session.summary();
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.id, session.id);
    }

    #[test]
    fn test_message_wire_format() {
        let msg = Message::assistant("hi", MessageKind::Code);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["type"], "code");

        let session = ChatSession::new();
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("lastMessagePreview").is_some());
    }

    #[test]
    fn test_research_request_defaults() {
        let req: ResearchRequest = serde_json::from_str(r#"{"topic": "rust"}"#).unwrap();
        assert_eq!(req.max_sources, DEFAULT_MAX_SOURCES);

        let req: ResearchRequest =
            serde_json::from_str(r#"{"topic": "rust", "max_results": 2}"#).unwrap();
        assert_eq!(req.max_sources, 2);

        let req: ChatRequest =
            serde_json::from_str(r#"{"messages": [{"role": "user", "content": "hi"}]}"#).unwrap();
        assert_eq!(req.mode, ChatMode::Chat);
    }
}
