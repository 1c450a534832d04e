//! agentmesh Mesh - Deployment, Discovery and Invocation
//!
//! [`Mesh`] composes an [`AgentDirectory`](agentmesh_directory::AgentDirectory)
//! with a [`MeshProtocol`](agentmesh_protocol::MeshProtocol):
//!
//! - `deploy_and_register`: send, register as `Initializing`, mark `Active`
//! - capability and type lookups over discovery
//! - `call_with_failover`: caller-level retry against other matching agents
//! - `get_workflow` / `run_workflow`: exact-type chains of agents

mod mesh;
mod workflow;

pub use mesh::{Mesh, ResolvedAgent};
pub use workflow::Workflow;
