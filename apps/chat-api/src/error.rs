use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::validation::RejectionReason;

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

/// Everything that can go wrong while handling a gateway event.
///
/// Only `Validation`, `Conflict`, and `AuthRequired` are ever shown to a
/// client, and only to the connection that caused them.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(RejectionReason),
    #[error("{0}")]
    Conflict(RejectionReason),
    #[error("You must set a pseudo before chatting")]
    AuthRequired,
    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ChatError {
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            ChatError::Validation(_) | ChatError::Conflict(_) | ChatError::AuthRequired
        )
    }
}

/// Durable-storage failures. Logged, never surfaced, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed history in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// HTTP errors
// ---------------------------------------------------------------------------

/// Structured API error returned to HTTP clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}
