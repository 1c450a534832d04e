//! Directory mutation events.

use crate::agent::{AgentInfo, AgentMetadata, AgentStatus};
use crate::identity::{AgentId, Timestamp};
use serde::{Deserialize, Serialize};

/// One registry mutation, published after the mutation is visible.
///
/// Update events carry both the old and the new value so subscribers never
/// need to query the directory to learn what changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum DirectoryEvent {
    /// A new agent was registered.
    AgentRegistered {
        agent_id: AgentId,
        info: AgentInfo,
        timestamp: Timestamp,
    },

    /// An agent was removed from the directory.
    AgentUnregistered {
        agent_id: AgentId,
        timestamp: Timestamp,
    },

    /// An agent's status changed.
    AgentStatusChanged {
        agent_id: AgentId,
        old_status: AgentStatus,
        new_status: AgentStatus,
        timestamp: Timestamp,
    },

    /// An agent's metadata was replaced.
    AgentMetadataUpdated {
        agent_id: AgentId,
        old_metadata: AgentMetadata,
        new_metadata: AgentMetadata,
        timestamp: Timestamp,
    },

    /// An agent reported a new load factor.
    AgentLoadChanged {
        agent_id: AgentId,
        old_load: Option<f64>,
        new_load: Option<f64>,
        timestamp: Timestamp,
    },
}

impl DirectoryEvent {
    /// The agent this event is about.
    pub fn agent_id(&self) -> AgentId {
        match self {
            DirectoryEvent::AgentRegistered { agent_id, .. }
            | DirectoryEvent::AgentUnregistered { agent_id, .. }
            | DirectoryEvent::AgentStatusChanged { agent_id, .. }
            | DirectoryEvent::AgentMetadataUpdated { agent_id, .. }
            | DirectoryEvent::AgentLoadChanged { agent_id, .. } => *agent_id,
        }
    }

    /// When the mutation was applied.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DirectoryEvent::AgentRegistered { timestamp, .. }
            | DirectoryEvent::AgentUnregistered { timestamp, .. }
            | DirectoryEvent::AgentStatusChanged { timestamp, .. }
            | DirectoryEvent::AgentMetadataUpdated { timestamp, .. }
            | DirectoryEvent::AgentLoadChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Event type name for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            DirectoryEvent::AgentRegistered { .. } => "AgentRegistered",
            DirectoryEvent::AgentUnregistered { .. } => "AgentUnregistered",
            DirectoryEvent::AgentStatusChanged { .. } => "AgentStatusChanged",
            DirectoryEvent::AgentMetadataUpdated { .. } => "AgentMetadataUpdated",
            DirectoryEvent::AgentLoadChanged { .. } => "AgentLoadChanged",
        }
    }
}
