use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON body for errors returned by the `/api` routes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Downloader error: {0}")]
    Downloader(String),

    #[error("Notify error: {0}")]
    Notify(String),
}

impl From<std::io::Error> for ArchiverError {
    fn from(err: std::io::Error) -> Self {
        ArchiverError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ArchiverError {
    fn from(err: serde_json::Error) -> Self {
        ArchiverError::Storage(err.to_string())
    }
}

impl IntoResponse for ArchiverError {
    fn into_response(self) -> Response {
        match self {
            ArchiverError::Validation(msg) => {
                tracing::warn!("Rejected request: {}", msg);
                (StatusCode::BAD_REQUEST, format!("Invalid input: {}", msg)).into_response()
            }
            ArchiverError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse {
                        error: "not_found".to_string(),
                        message: msg,
                    }),
                )
                    .into_response()
            }
            other => {
                // Details stay in the log; the page only gets a generic message.
                tracing::error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong. Check the server log.",
                )
                    .into_response()
            }
        }
    }
}
