//! Mapping of errors onto HTTP responses

use crate::error::TengenError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// JSON body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub status_code: u16,
}

impl TengenError {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            TengenError::Validation(_) => StatusCode::BAD_REQUEST,
            TengenError::NotFound(_) => StatusCode::NOT_FOUND,
            TengenError::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            TengenError::Busy => StatusCode::CONFLICT,
            TengenError::Upstream(_) | TengenError::Embedding(_) | TengenError::Network(_) => {
                StatusCode::BAD_GATEWAY
            }
            TengenError::Backend { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TengenError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        let body = ErrorBody {
            message: self.to_string(),
            status_code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
