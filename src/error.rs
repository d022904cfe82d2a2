//! Error types for the Tengen research assistant
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation.

use thiserror::Error;

/// Main error type for Tengen operations
#[derive(Error, Debug)]
pub enum TengenError {
    /// Input rejected before any request was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upload rejected because of its file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// A generation is already in flight
    #[error("A response is already being generated")]
    Busy,

    /// Request stopped by the user
    #[error("Request cancelled")]
    Cancelled,

    /// Backend unreachable (connect failure, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a non-success status
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// LLM or scrape provider failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Session, file or document not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// SQLite or pool failure
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl TengenError {
    /// Whether this error means the backend could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        match self {
            TengenError::Network(_) => true,
            TengenError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Result type alias for Tengen operations
pub type Result<T> = std::result::Result<T, TengenError>;

/// Convert anyhow::Error to TengenError
impl From<anyhow::Error> for TengenError {
    fn from(err: anyhow::Error) -> Self {
        TengenError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TengenError::NotFound("session abc".to_string());
        assert_eq!(err.to_string(), "Not found: session abc");

        let err = TengenError::Backend {
            status: 502,
            message: "Gemini unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "Backend error (502): Gemini unavailable");
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(TengenError::Network("connection refused".to_string()).is_connectivity());
        assert!(!TengenError::Upstream("quota exceeded".to_string()).is_connectivity());
        assert!(!TengenError::Validation("empty".to_string()).is_connectivity());
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json");
        assert!(json_err.is_err());

        let err: TengenError = json_err.unwrap_err().into();
        assert!(matches!(err, TengenError::Serialization(_)));
    }
}
