//! Identity types for agentmesh entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Agent identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, so ids issued later sort later.
pub type AgentId = Uuid;

/// Envelope identifier.
pub type MessageId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 AgentId (timestamp-sortable).
pub fn new_agent_id() -> AgentId {
    Uuid::now_v7()
}

/// Generate a new envelope id.
pub fn new_message_id() -> MessageId {
    Uuid::now_v7()
}
