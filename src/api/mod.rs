//! HTTP API for the research assistant
//!
//! Provides:
//! - Streamed chat and code-assist replies (`text/plain`)
//! - Research, code and document Q&A JSON endpoints
//! - Document upload and download
//! - Health probes

pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use error::ErrorBody;
pub use server::{build_router, ApiServer, ApiServerConfig};
pub use state::AppState;
