//! Error types for the HTTP server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facetdb_core::CoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving a request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Error from the engine.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Malformed body, multipart payload or query.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The body exceeds the configured limit.
    #[error("payload too large: limit is {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit.
        limit: usize,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable kind.
    pub kind: &'static str,
}

impl ServerError {
    /// Creates an invalid request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns the HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Core(CoreError::Field { .. }) | Self::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the `kind` reported in the error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Core(CoreError::UnknownEntity { .. }) => "unknown_entity",
            Self::Core(CoreError::DocumentNotFound { .. }) => "not_found",
            Self::Core(CoreError::Field { .. }) => "field",
            Self::Core(CoreError::Attachment { .. }) => "attachment",
            Self::Core(_) => "storage",
            Self::InvalidRequest(_) => "invalid_request",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Internal(_) | Self::Io(_) => "internal",
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::invalid("bad json").is_client_error());
        assert!(ServerError::PayloadTooLarge { limit: 1 }.is_client_error());
        assert!(ServerError::Core(CoreError::field("name", "not a string")).is_client_error());
        assert!(ServerError::Core(CoreError::unknown_entity("ghost")).is_client_error());

        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(ServerError::Core(CoreError::attachment("disk full")).is_server_error());
        assert!(ServerError::Core(CoreError::DataDirLocked).is_server_error());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ServerError::Core(CoreError::not_found("team", "x")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Core(CoreError::unknown_entity("ghost")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Core(CoreError::field("x", "y")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn transparent_core_message() {
        let err = ServerError::from(CoreError::unknown_entity("ghost"));
        assert_eq!(err.to_string(), "unknown entity: ghost");
        assert_eq!(err.kind(), "unknown_entity");
    }
}
