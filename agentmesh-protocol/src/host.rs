//! Remote side of the protocol: the agents deployed at one location.

use crate::agent::{AgentCatalog, AgentDescriptor, ErasedAgent, ProcessError};
use crate::codec::check_type_tag;
use crate::reply::error_reply;
use agentmesh_core::{
    metadata_keys, new_agent_id, AgentId, Location, MeshError, MeshResult, MessageEnvelope,
    MessageType, NoopRecorder, OperationTimer, ProtocolError, RemoteAgentRef, SerializationError,
    SharedRecorder, ValidationError,
};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "host";

#[derive(Clone)]
struct Deployed {
    agent: Arc<dyn ErasedAgent>,
    reference: RemoteAgentRef,
}

/// Runtime for the agents deployed at one location.
///
/// Serves the envelope state machine: `AGENT_DEPLOY` → `AGENT_RESPONSE`,
/// `AGENT_CALL` → `AGENT_RESPONSE` | `AGENT_NOT_FOUND`,
/// `AGENT_GET` → `AGENT_FOUND` | `AGENT_NOT_FOUND`.
pub struct AgentHost {
    location: Location,
    catalog: AgentCatalog,
    agents: DashMap<AgentId, Deployed>,
    recorder: SharedRecorder,
}

impl std::fmt::Debug for AgentHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHost")
            .field("location", &self.location)
            .field("deployed", &self.agents.len())
            .finish()
    }
}

impl AgentHost {
    pub fn new(location: Location, catalog: AgentCatalog) -> Self {
        Self {
            location,
            catalog,
            agents: DashMap::new(),
            recorder: NoopRecorder::shared(),
        }
    }

    pub fn with_recorder(mut self, recorder: SharedRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    /// Install an already-built agent under a fresh id.
    pub fn install(&self, agent: Arc<dyn ErasedAgent>) -> RemoteAgentRef {
        let reference = RemoteAgentRef::new(
            new_agent_id(),
            self.location.clone(),
            agent.input_type(),
            agent.output_type(),
        );
        info!(
            agent_id = %reference.id,
            kind = %agent.descriptor().kind,
            location = %self.location,
            "Agent deployed"
        );
        self.agents.insert(
            reference.id,
            Deployed {
                agent,
                reference: reference.clone(),
            },
        );
        reference
    }

    /// Rebuild an agent from its descriptor through the catalog and install it.
    pub fn deploy(&self, descriptor: &AgentDescriptor) -> MeshResult<RemoteAgentRef> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "deploy");
        let result = self
            .catalog
            .instantiate(descriptor)
            .map(|agent| self.install(agent))
            .map_err(|e| {
                warn!(kind = %descriptor.kind, error = %e, "Agent deployment rejected");
                MeshError::from(ValidationError::InvalidValue {
                    field: "agent".to_string(),
                    reason: e.message,
                })
            });
        timer.observe(result)
    }

    /// Remove a deployed agent. Returns whether it existed.
    pub fn undeploy(&self, agent_id: AgentId) -> bool {
        let removed = self.agents.remove(&agent_id).is_some();
        if removed {
            info!(agent_id = %agent_id, "Agent undeployed");
        }
        removed
    }

    pub fn get(&self, agent_id: AgentId) -> Option<Arc<dyn ErasedAgent>> {
        self.agents.get(&agent_id).map(|d| Arc::clone(&d.agent))
    }

    pub fn reference_for(&self, agent_id: AgentId) -> Option<RemoteAgentRef> {
        self.agents.get(&agent_id).map(|d| d.reference.clone())
    }

    pub fn contains(&self, agent_id: AgentId) -> bool {
        self.agents.contains_key(&agent_id)
    }

    pub fn deployed_count(&self) -> usize {
        self.agents.len()
    }

    /// Run a deployed agent on an encoded input.
    ///
    /// When `input_type` is given it must equal the agent's declared input tag.
    pub async fn call(
        &self,
        agent_id: AgentId,
        input_type: Option<&str>,
        input: &[u8],
    ) -> MeshResult<Vec<u8>> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "call");
        let result = self.call_inner(agent_id, input_type, input).await;
        timer.observe(result)
    }

    async fn call_inner(
        &self,
        agent_id: AgentId,
        input_type: Option<&str>,
        input: &[u8],
    ) -> MeshResult<Vec<u8>> {
        // Clone out of the map so no shard lock is held across the await.
        let agent = self
            .get(agent_id)
            .ok_or(ProtocolError::NotFound { agent_id })?;
        if let Some(tag) = input_type {
            check_type_tag(&agent.input_type(), tag)?;
        }

        debug!(agent_id = %agent_id, bytes = input.len(), "Invoking agent");
        agent.process_bytes(input).await.map_err(|e| match e {
            ProcessError::Serialization(e) => MeshError::from(e),
            ProcessError::Agent(e) => {
                warn!(agent_id = %agent_id, error = %e, "Agent failed");
                ProtocolError::Remote {
                    agent_id,
                    reason: e.message,
                }
                .into()
            }
        })
    }

    /// Answer one request envelope. Never fails; errors become replies.
    pub async fn handle_envelope(&self, envelope: MessageEnvelope) -> MessageEnvelope {
        debug!(
            message_id = %envelope.id,
            message_type = %envelope.message_type,
            "Handling envelope"
        );
        let result = match envelope.message_type {
            MessageType::AgentDeploy => self.handle_deploy(&envelope),
            MessageType::AgentCall => self.handle_call(&envelope).await,
            MessageType::AgentGet => Ok(self.handle_get(&envelope)),
            other => Err(ValidationError::InvalidValue {
                field: "messageType".to_string(),
                reason: format!("{} is a reply type, not a request", other),
            }
            .into()),
        };
        result.unwrap_or_else(|error| error_reply(&envelope, &error))
    }

    fn handle_deploy(&self, envelope: &MessageEnvelope) -> MeshResult<MessageEnvelope> {
        let descriptor = AgentDescriptor::from_bytes(&envelope.payload)?;
        let reference = self.deploy(&descriptor)?;
        Ok(deploy_reply(envelope, &reference)?)
    }

    async fn handle_call(&self, envelope: &MessageEnvelope) -> MeshResult<MessageEnvelope> {
        let agent_id = envelope
            .agent_id()
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: metadata_keys::AGENT_ID.to_string(),
            })?;
        let input_type = envelope.metadata_value(metadata_keys::INPUT_TYPE);
        let output = self.call(agent_id, input_type, &envelope.payload).await?;

        let mut reply = envelope.reply(MessageType::AgentResponse, output);
        if let Some(reference) = self.reference_for(agent_id) {
            reply = reply.with_metadata(metadata_keys::OUTPUT_TYPE, reference.output_type);
        }
        Ok(reply)
    }

    fn handle_get(&self, envelope: &MessageEnvelope) -> MessageEnvelope {
        let found = envelope
            .agent_id()
            .and_then(|id| self.reference_for(id))
            .and_then(|reference| serde_json::to_vec(&reference).ok());
        match found {
            Some(payload) => envelope.reply(MessageType::AgentFound, payload),
            None => envelope.reply(MessageType::AgentNotFound, Vec::new()),
        }
    }
}

/// `AGENT_RESPONSE` to a deploy request, carrying the new reference.
pub fn deploy_reply(
    request: &MessageEnvelope,
    reference: &RemoteAgentRef,
) -> Result<MessageEnvelope, SerializationError> {
    let payload = serde_json::to_vec(reference).map_err(|e| SerializationError::Encode {
        type_tag: "ref".to_string(),
        reason: e.to_string(),
    })?;
    Ok(request
        .reply(MessageType::AgentResponse, payload)
        .with_metadata(metadata_keys::AGENT_ID, reference.id.to_string()))
}

/// Parse the reference carried by a deploy or get reply.
pub fn reference_from_reply(reply: &MessageEnvelope) -> Result<RemoteAgentRef, SerializationError> {
    serde_json::from_slice(&reply.payload).map_err(|e| SerializationError::Decode {
        type_tag: "ref".to_string(),
        reason: e.to_string(),
    })
}
