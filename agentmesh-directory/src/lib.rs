//! agentmesh Directory - Agent Registry and Discovery
//!
//! Owns the authoritative set of [`AgentInfo`] records for one node:
//! registration, capability-based discovery, status/metadata/load updates and
//! a feed of every mutation.
//!
//! # Key Types
//!
//! - [`AgentDirectory`]: the operation set, object-safe so the mesh and the
//!   HTTP layer can hold an `Arc<dyn AgentDirectory>`
//! - [`InMemoryDirectory`]: sharded concurrent map implementation
//! - [`matching`]: the five-condition query predicate and result ordering

mod directory;
mod in_memory;
pub mod matching;

pub use directory::AgentDirectory;
pub use in_memory::InMemoryDirectory;

pub use agentmesh_core::{
    AgentId, AgentInfo, AgentMetadata, AgentQuery, AgentStatus, DirectoryConfig, DirectoryError,
    DirectoryEvent, DuplicatePolicy, RemoteAgentRef,
};
pub use agentmesh_events::{EventFeed, EventSubscription};
