//! The directory contract.

use agentmesh_core::{
    AgentId, AgentInfo, AgentMetadata, AgentQuery, AgentStatus, MeshResult, RemoteAgentRef,
};
use agentmesh_events::EventSubscription;

/// Authoritative set of agent records for one node.
///
/// All operations are in-memory and non-blocking. Reads never fail: unknown
/// ids yield `None` and queries with no matches yield an empty list.
/// Mutations on unknown ids fail with `DirectoryError::NotFound`.
pub trait AgentDirectory: Send + Sync {
    /// Register `reference` with `metadata` under the configured initial status.
    fn register_agent(
        &self,
        reference: RemoteAgentRef,
        metadata: AgentMetadata,
    ) -> MeshResult<AgentInfo>;

    /// Register with an explicit initial status.
    fn register_with_status(
        &self,
        reference: RemoteAgentRef,
        metadata: AgentMetadata,
        status: AgentStatus,
    ) -> MeshResult<AgentInfo>;

    /// Remove the record if present. Idempotent; returns the removed record.
    fn unregister_agent(&self, agent_id: AgentId) -> Option<AgentInfo>;

    /// Matching records, newest first, truncated to the query limit.
    fn discover_agents(&self, query: &AgentQuery) -> Vec<AgentInfo>;

    fn get_agent_info(&self, agent_id: AgentId) -> Option<AgentInfo>;

    fn update_agent_status(&self, agent_id: AgentId, status: AgentStatus)
        -> MeshResult<AgentInfo>;

    fn update_agent_metadata(
        &self,
        agent_id: AgentId,
        metadata: AgentMetadata,
    ) -> MeshResult<AgentInfo>;

    fn update_agent_load_factor(
        &self,
        agent_id: AgentId,
        load_factor: Option<f64>,
    ) -> MeshResult<AgentInfo>;

    /// Refresh `last_updated` without publishing an event.
    fn heartbeat(&self, agent_id: AgentId) -> MeshResult<AgentInfo>;

    /// Receive every event published after this call.
    fn subscribe_to_events(&self) -> EventSubscription;

    fn get_all_agents(&self) -> Vec<AgentInfo>;

    fn agent_count(&self) -> usize;

    fn active_count(&self) -> usize;
}
