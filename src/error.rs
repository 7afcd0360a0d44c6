//! Error types for the RAG service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Declared file type is not in the accepted set
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Underlying decoder failed on the uploaded bytes
    #[error("Failed to parse '{filename}': {message}")]
    ParseFailure { filename: String, message: String },

    /// Embedding endpoint failed after exhausting retries
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailure(String),

    /// Vector index is unreachable or returned a server error
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// Answer generation provider failed
    #[error("Answer generation failed: {0}")]
    GenerationFailure(String),

    /// (tenant, filename) uniqueness violated by a concurrent upload
    #[error("Document '{filename}' already exists for tenant '{tenant_id}'")]
    DuplicateFilename { tenant_id: String, filename: String },

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or incomplete request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Metadata/history store error
    #[error("Metadata store error: {0}")]
    Metadata(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a parse failure error
    pub fn parse_failure(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseFailure {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding failure error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingFailure(message.into())
    }

    /// Create an index failure error
    pub fn index(message: impl Into<String>) -> Self {
        Self::IndexUnavailable(message.into())
    }

    /// Create a generation failure error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailure(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code for the calling layer
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::ParseFailure { .. } => "parse_failure",
            Error::EmbeddingFailure(_) => "embedding_failure",
            Error::IndexUnavailable(_) => "index_unavailable",
            Error::GenerationFailure(_) => "generation_failure",
            Error::DuplicateFilename { .. } => "duplicate_filename",
            Error::NotFound(_) => "not_found",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Metadata(_) => "metadata_error",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Http(_) => "http_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::UnsupportedFormat(_)
            | Error::ParseFailure { .. }
            | Error::InvalidRequest(_)
            | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::DuplicateFilename { .. } => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::IndexUnavailable(_) | Error::GenerationFailure(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_)
            | Error::EmbeddingFailure(_)
            | Error::Metadata(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "type": self.code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::UnsupportedFormat("exe".into()).code(), "unsupported_format");
        assert_eq!(Error::EmbeddingFailure("timeout".into()).code(), "embedding_failure");
        assert_eq!(
            Error::DuplicateFilename {
                tenant_id: "t1".into(),
                filename: "a.pdf".into()
            }
            .code(),
            "duplicate_filename"
        );
    }
}
