// src/error.rs
// Centralized error taxonomy for the orchestrator, store, and HTTP boundary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy shared by the Store, FileStore, Indexer, Search, and Orchestrator.
///
/// Every variant maps to exactly one HTTP status at the API boundary (`IntoResponse` below);
/// `AdapterError` never reaches that boundary directly — the Orchestrator catches it per-agent
/// and reports it inside a turn result instead of failing the request.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("provider {provider} error: {detail}")]
    Adapter {
        provider: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn adapter(provider: impl Into<String>, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Adapter {
            provider: provider.into(),
            status,
            detail: detail.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CoreError::Adapter { .. } => StatusCode::BAD_GATEWAY,
            CoreError::Internal(_)
            | CoreError::Db(_)
            | CoreError::Pool(_)
            | CoreError::Io(_)
            | CoreError::Json(_)
            | CoreError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            CoreError::Adapter { .. } => "ADAPTER_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        // Internal details are logged but not echoed verbatim to the client.
        let message = match &self {
            CoreError::Internal(_) | CoreError::Db(_) | CoreError::Pool(_) | CoreError::Io(_) => {
                tracing::error!(error = %self, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let status = self.status_code();
        let body = json!({
            "error": true,
            "message": message,
            "status": status.as_u16(),
            "error_code": self.error_code(),
        });

        (status, Json(body)).into_response()
    }
}
