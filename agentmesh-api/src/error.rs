//! Error Types for the agentmesh HTTP binding
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - The mapping from the mesh error taxonomy onto HTTP status codes
//!
//! All errors are serialized as JSON with appropriate HTTP status codes. The
//! HTTP transport client reads the `code` field back, so codes are part of
//! the wire contract.

use agentmesh_core::{DirectoryError, ErrorKind, MeshError, ProtocolError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested agent is not deployed or not registered here
    AgentNotFound,

    /// No registered agent matches the request
    NoMatchingAgent,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// An agent with the same id is already registered
    AgentAlreadyRegistered,

    // ========================================================================
    // Upstream Errors (502, 504)
    // ========================================================================
    /// A downstream node could not be reached
    TransportError,

    /// Operation timed out
    Timeout,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Payload or envelope could not be encoded or decoded
    SerializationError,

    /// The agent's own logic reported a failure
    AgentFailed,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,

            ErrorCode::AgentNotFound | ErrorCode::NoMatchingAgent => StatusCode::NOT_FOUND,

            ErrorCode::AgentAlreadyRegistered => StatusCode::CONFLICT,

            ErrorCode::TransportError => StatusCode::BAD_GATEWAY,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::SerializationError | ErrorCode::AgentFailed | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
///
/// Returned by every endpoint when an error occurs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn agent_not_found(agent_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::AgentNotFound,
            format!("Agent {} not found", agent_id),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Convert ApiError into an HTTP response.
///
/// The body is the JSON form of the error; the status comes from its code.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<MeshError> for ApiError {
    fn from(err: MeshError) -> Self {
        let kind = err.kind();
        let code = match (&err, kind) {
            (MeshError::Protocol(ProtocolError::Remote { .. }), _) => ErrorCode::AgentFailed,
            (MeshError::Config(_), _) => ErrorCode::InternalError,
            (MeshError::Directory(DirectoryError::NoMatchingAgent { .. }), _) => {
                ErrorCode::NoMatchingAgent
            }
            (_, ErrorKind::NotFound) => ErrorCode::AgentNotFound,
            (_, ErrorKind::Validation) => ErrorCode::ValidationFailed,
            (_, ErrorKind::Conflict) => ErrorCode::AgentAlreadyRegistered,
            (_, ErrorKind::Transport) => ErrorCode::TransportError,
            (_, ErrorKind::Timeout) => ErrorCode::Timeout,
            (_, ErrorKind::Serialization) => ErrorCode::SerializationError,
            (_, ErrorKind::Internal) => ErrorCode::InternalError,
        };

        if code.status_code().is_server_error() {
            tracing::error!(error = %err, kind = kind.as_str(), "Mesh operation failed");
        }

        ApiError::new(code, err.to_string()).with_details(serde_json::json!({
            "kind": kind.as_str(),
        }))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_format("agent_id", &format!("a UUID ({})", err))
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
