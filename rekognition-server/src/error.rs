//! API error handling module
//!
//! Maps library failures onto HTTP statuses with a stable `code` field.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rekognition_core::RekognitionError;
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Not found - unknown entity
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error raised by a scan
    #[error(transparent)]
    Rekognition(#[from] RekognitionError),
}

impl ApiError {
    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Rekognition(e) => match e {
                // Camera could not deliver a usable frame
                RekognitionError::SourceUnavailable(_) | RekognitionError::Image(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                // Upstream call failed
                RekognitionError::Service(_) | RekognitionError::Http(_) => StatusCode::BAD_GATEWAY,
                RekognitionError::Config(_)
                | RekognitionError::Persistence(_)
                | RekognitionError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Rekognition(e) => match e {
                RekognitionError::Config(_) => "CONFIG_ERROR",
                RekognitionError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
                RekognitionError::Image(_) => "INVALID_FRAME",
                RekognitionError::Service(_) | RekognitionError::Http(_) => "UPSTREAM_ERROR",
                RekognitionError::Persistence(_) => "PERSISTENCE_ERROR",
                RekognitionError::Serialization(_) => "SERIALIZATION_ERROR",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::warn!(status = %status, code = code, error = %message, "Request failed");
        } else {
            tracing::debug!(status = %status, code = code, error = %message, "Client error");
        }

        let body = serde_json::json!({
            "error": message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
