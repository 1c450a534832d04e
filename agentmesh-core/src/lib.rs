//! agentmesh Core - Data Model
//!
//! Pure data structures shared by every other crate in the workspace:
//! - Identity aliases (agent ids, timestamps)
//! - Locations and remote agent references
//! - Agent metadata, status and directory records
//! - Discovery queries and directory events
//! - The wire-level message envelope
//! - The error taxonomy and configuration types
//!
//! This crate holds no I/O. The directory, protocol and HTTP layers build on
//! top of it.

pub mod agent;
pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
pub mod identity;
pub mod location;
pub mod query;
pub mod telemetry;

pub use agent::{validate_load_factor, AgentInfo, AgentMetadata, AgentStatus, RemoteAgentRef};
pub use config::{
    DirectoryConfig, DuplicatePolicy, EventFeedConfig, MeshConfig, ProtocolConfig,
};
pub use envelope::{metadata_keys, MessageEnvelope, MessageType};
pub use error::{
    DirectoryError, ErrorKind, MeshError, MeshResult, ProtocolError, SerializationError,
    ValidationError,
};
pub use event::DirectoryEvent;
pub use identity::{new_agent_id, new_message_id, AgentId, MessageId, Timestamp};
pub use location::Location;
pub use query::{AgentQuery, DEFAULT_QUERY_LIMIT};
pub use telemetry::{NoopRecorder, OperationRecorder, OperationTimer, SharedRecorder};
