//! Layered configuration for Tengen
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config` or `TENGEN_CONFIG`)
//! 3. `TENGEN_*` environment variables, `__` separating nested keys
//!    (e.g. `TENGEN_SERVER__PORT=9000`)
//! 4. `GOOGLE_API_KEY` and `TENGEN_API_URL` shortcuts

use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default backend port
pub const DEFAULT_PORT: u16 = 8000;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TengenConfig {
    pub server: ServerConfig,
    pub llm: LlmSettings,
    pub embeddings: EmbeddingSettings,
    pub research: ResearchSettings,
    pub rag: RagSettings,
    pub client: ClientSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// CORS origins; empty means any origin
    pub allowed_origins: Vec<String>,
    /// Uploaded files and research dumps
    pub data_dir: PathBuf,
    /// Vector index database
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            data_dir: base_dir().join("data"),
            db_path: base_dir().join("index.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub base_url: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 2048,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

/// Which embedding backend indexes documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Gemini,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Gemini,
            model: "text-embedding-004".to_string(),
            dimensions: 768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    /// URL templates; `{topic_underscore}` and `{topic_query}` are substituted
    pub sources: Vec<String>,
    pub delay_ms: u64,
    pub timeout_secs: u64,
    /// Sources scraped when research is triggered from chat
    pub chat_max_sources: usize,
    pub user_agent: String,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            sources: vec![
                "https://en.wikipedia.org/wiki/{topic_underscore}".to_string(),
                "https://www.reddit.com/search/?q={topic_query}".to_string(),
            ],
            delay_ms: 1000,
            timeout_secs: 10,
            chat_max_sources: 3,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub temperature: f32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            top_k: 5,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub api_url: String,
    pub session_db: PathBuf,
    pub max_sessions: usize,
    pub accepted_extensions: Vec<String>,
    /// Bounds JSON calls end to end and streamed replies until their first byte
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: format!("http://127.0.0.1:{}", DEFAULT_PORT),
            session_db: base_dir().join("sessions.db"),
            max_sessions: 50,
            accepted_extensions: vec!["json".to_string(), "txt".to_string(), "md".to_string()],
            request_timeout_secs: 120,
        }
    }
}

/// Root directory for Tengen state
pub fn base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tengen")
}

impl TengenConfig {
    /// Load configuration, reading `TENGEN_CONFIG` when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = env::var("TENGEN_CONFIG").ok().map(PathBuf::from);
        let file = path.map(Path::to_path_buf).or(env_path);

        let mut builder = Config::builder().add_source(Config::try_from(&TengenConfig::default())?);

        if let Some(file) = &file {
            debug!("Reading config file {}", file.display());
            builder = builder.add_source(File::from(file.as_path()).required(false));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("TENGEN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: TengenConfig = settings.try_deserialize()?;
        config.apply_env_shortcuts();
        Ok(config)
    }

    fn apply_env_shortcuts(&mut self) {
        if self.llm.api_key.is_empty() {
            if let Ok(key) = env::var("GOOGLE_API_KEY") {
                if !key.is_empty() {
                    debug!("Using API key from GOOGLE_API_KEY environment variable");
                    self.llm.api_key = key;
                }
            }
        }

        if let Ok(url) = env::var("TENGEN_API_URL") {
            if !url.is_empty() {
                self.client.api_url = url;
            }
        }
    }

    /// Whether an LLM key is available
    pub fn llm_configured(&self) -> bool {
        !self.llm.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TengenConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.rag.chunk_overlap, 100);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.client.max_sessions, 50);
        assert_eq!(config.embeddings.dimensions, 768);
        assert_eq!(config.llm.model, "gemini-2.5-flash");
    }

    #[test]
    #[serial]
    fn test_file_and_env_layers() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 9100\n\n[rag]\ntop_k = 3").unwrap();

        env::set_var("TENGEN_RAG__CHUNK_SIZE", "500");
        env::set_var("GOOGLE_API_KEY", "test-key");
        env::set_var("TENGEN_API_URL", "http://backend:8000");

        let config = TengenConfig::load(Some(file.path())).unwrap();

        env::remove_var("TENGEN_RAG__CHUNK_SIZE");
        env::remove_var("GOOGLE_API_KEY");
        env::remove_var("TENGEN_API_URL");

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.rag.chunk_size, 500);
        assert_eq!(config.llm.api_key, "test-key");
        assert_eq!(config.client.api_url, "http://backend:8000");
        assert!(config.llm_configured());
    }
}
