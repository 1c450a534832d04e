//! Error types for agentmesh operations

use crate::identity::AgentId;
use std::time::Duration;
use thiserror::Error;

/// Directory mutation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Agent not found: {agent_id}")]
    NotFound { agent_id: AgentId },

    #[error("Agent already registered: {agent_id}")]
    AlreadyRegistered { agent_id: AgentId },

    #[error("No agent matches {query}")]
    NoMatchingAgent { query: String },
}

/// Transport-level protocol errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Remote endpoint reports unknown agent: {agent_id}")]
    NotFound { agent_id: AgentId },

    #[error("Transport failure to {location}: {reason}")]
    Transport { location: String, reason: String },

    #[error("Operation {operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("Remote agent {agent_id} failed: {reason}")]
    Remote { agent_id: AgentId, reason: String },

    #[error("Unexpected reply to {request}: {reply}")]
    UnexpectedReply { request: String, reply: String },
}

/// Payload and frame codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Failed to encode {type_tag}: {reason}")]
    Encode { type_tag: String, reason: String },

    #[error("Failed to decode {type_tag}: {reason}")]
    Decode { type_tag: String, reason: String },

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Malformed frame: {reason}")]
    Frame { reason: String },
}

/// Validation errors for queries, metadata and configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Value for {field} out of range: {value} not in {range}")]
    OutOfRange {
        field: String,
        value: String,
        range: String,
    },
}

/// Coarse error classification shared by every layer.
///
/// The HTTP binding maps these onto status codes; callers use them to decide
/// whether to retry against another agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Transport,
    Serialization,
    Timeout,
    Validation,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::NotFound,
        ErrorKind::Transport,
        ErrorKind::Serialization,
        ErrorKind::Timeout,
        ErrorKind::Validation,
        ErrorKind::Conflict,
        ErrorKind::Internal,
    ];

    /// Stable name used in envelope metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Transport => "Transport",
            ErrorKind::Serialization => "Serialization",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Validation => "Validation",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Internal => "Internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ErrorKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Whether a caller may reasonably try a different matching agent.
    pub fn is_retryable_elsewhere(&self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound | ErrorKind::Transport | ErrorKind::Timeout
        )
    }
}

/// Master error type for all agentmesh errors.
#[derive(Debug, Clone, Error)]
pub enum MeshError {
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(String),
}

impl MeshError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MeshError::Directory(DirectoryError::NotFound { .. }) => ErrorKind::NotFound,
            MeshError::Directory(DirectoryError::AlreadyRegistered { .. }) => ErrorKind::Conflict,
            MeshError::Directory(DirectoryError::NoMatchingAgent { .. }) => ErrorKind::NotFound,
            MeshError::Protocol(ProtocolError::NotFound { .. }) => ErrorKind::NotFound,
            MeshError::Protocol(ProtocolError::Transport { .. }) => ErrorKind::Transport,
            MeshError::Protocol(ProtocolError::Timeout { .. }) => ErrorKind::Timeout,
            MeshError::Protocol(ProtocolError::Remote { .. }) => ErrorKind::Internal,
            MeshError::Protocol(ProtocolError::UnexpectedReply { .. }) => ErrorKind::Transport,
            MeshError::Serialization(_) => ErrorKind::Serialization,
            MeshError::Validation(_) => ErrorKind::Validation,
            MeshError::Config(_) => ErrorKind::Validation,
        }
    }
}

/// Result type alias for agentmesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

// =============================================================================
// TESTS
// =============================================================================
