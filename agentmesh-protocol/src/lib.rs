//! agentmesh protocol
//!
//! Moves agents and calls between nodes.
//!
//! ```text
//!   caller                                        destination node
//!   ──────                                        ────────────────
//!   MeshProtocolExt::call_remote_agent<I, O>
//!     │ check I/O tags, codec::encode
//!     ▼
//!   MeshProtocol::call_remote_bytes ──envelope──▶ AgentHost::handle_envelope
//!     (LocalProtocol: framed in-process)            │ lookup, tag check
//!     (HttpProtocol: POST /agents/{id}/call)        ▼
//!                                                 ErasedAgent::process_bytes
//!     ◀────────────── AGENT_RESPONSE / AGENT_NOT_FOUND ┘
//!   codec::decode
//! ```
//!
//! Payloads use the JSON payload codec in [`codec`]; envelopes use the
//! binary frame format in [`frame`].

pub mod agent;
pub mod codec;
pub mod frame;
mod host;
pub mod http;
mod local;
mod protocol;
pub mod reply;

pub use agent::{
    Agent, AgentCatalog, AgentDescriptor, AgentError, ErasedAgent, ProcessError, TypedAgent,
};
pub use codec::MeshType;
pub use frame::{decode_frame, encode_frame};
pub use host::{deploy_reply, reference_from_reply, AgentHost};
pub use http::{envelope_from_http, envelope_headers, DeployResponse, HttpProtocol};
pub use local::{LocalNetwork, LocalProtocol};
pub use protocol::{AgentHandle, MeshProtocol, MeshProtocolExt};

// Re-export the envelope types so transports need only this crate
pub use agentmesh_core::{metadata_keys, MessageEnvelope, MessageType, RemoteAgentRef};
