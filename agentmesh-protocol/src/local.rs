//! In-process transport.
//!
//! Hosts attach to a shared [`LocalNetwork`] under their location. Every
//! envelope is framed and unframed on the way in and out, so local traffic
//! goes through the same codec as remote traffic. Deployment hands the agent
//! instance to the host directly after its descriptor has crossed the
//! codec, and [`MeshProtocol::get_remote_agent`] can return a local handle.

use crate::agent::{AgentDescriptor, ErasedAgent};
use crate::frame::{decode_frame, encode_frame};
use crate::host::{deploy_reply, reference_from_reply, AgentHost};
use crate::protocol::{AgentHandle, MeshProtocol};
use crate::reply::expect_reply;
use agentmesh_core::{
    metadata_keys, Location, MeshResult, MessageEnvelope, MessageType, NoopRecorder,
    OperationTimer, ProtocolConfig, ProtocolError, RemoteAgentRef, SerializationError,
    SharedRecorder,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const COMPONENT: &str = "protocol";

/// Hosts reachable in this process, keyed by location.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    hosts: Arc<DashMap<Location, Arc<AgentHost>>>,
}

impl std::fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNetwork")
            .field("hosts", &self.hosts.len())
            .finish()
    }
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `host` reachable at its location, replacing any previous host.
    pub fn attach(&self, host: Arc<AgentHost>) {
        self.hosts.insert(host.location().clone(), host);
    }

    pub fn detach(&self, location: &Location) -> Option<Arc<AgentHost>> {
        self.hosts.remove(location).map(|(_, host)| host)
    }

    pub fn host(&self, location: &Location) -> Option<Arc<AgentHost>> {
        self.hosts.get(location).map(|h| Arc::clone(h.value()))
    }

    pub fn locations(&self) -> Vec<Location> {
        let mut locations: Vec<Location> = self.hosts.iter().map(|e| e.key().clone()).collect();
        locations.sort();
        locations
    }
}

/// [`MeshProtocol`] over a [`LocalNetwork`].
#[derive(Clone)]
pub struct LocalProtocol {
    network: LocalNetwork,
    call_timeout: Duration,
    recorder: SharedRecorder,
}

impl std::fmt::Debug for LocalProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProtocol")
            .field("network", &self.network)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl LocalProtocol {
    pub fn new(network: LocalNetwork, config: &ProtocolConfig) -> Self {
        Self {
            network,
            call_timeout: config.call_timeout(),
            recorder: NoopRecorder::shared(),
        }
    }

    pub fn with_recorder(mut self, recorder: SharedRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn network(&self) -> &LocalNetwork {
        &self.network
    }

    fn host(&self, location: &Location) -> MeshResult<Arc<AgentHost>> {
        self.network.host(location).ok_or_else(|| {
            ProtocolError::Transport {
                location: location.to_string(),
                reason: "no host attached at this location".to_string(),
            }
            .into()
        })
    }

    /// Frame, deliver and unframe one request and its reply.
    async fn exchange(&self, host: &AgentHost, envelope: &MessageEnvelope) -> MeshResult<MessageEnvelope> {
        let request = decode_frame(&encode_frame(envelope)?)?;
        let reply = host.handle_envelope(request).await;
        Ok(decode_frame(&encode_frame(&reply)?)?)
    }

    async fn send_agent_inner(
        &self,
        agent: Arc<dyn ErasedAgent>,
        destination: &Location,
    ) -> MeshResult<RemoteAgentRef> {
        let host = self.host(destination)?;
        let envelope = MessageEnvelope::new(MessageType::AgentDeploy, agent.descriptor().to_bytes()?);
        let request = decode_frame(&encode_frame(&envelope)?)?;
        let descriptor = AgentDescriptor::from_bytes(&request.payload)?;
        if descriptor != agent.descriptor() {
            return Err(SerializationError::Decode {
                type_tag: "agent".to_string(),
                reason: "descriptor changed in transit".to_string(),
            }
            .into());
        }

        let reference = host.install(agent);
        let reply = decode_frame(&encode_frame(&deploy_reply(&request, &reference)?)?)?;
        let reply = expect_reply(&envelope, reply, MessageType::AgentResponse, destination)?;
        Ok(reference_from_reply(&reply)?)
    }

    async fn call_inner(&self, reference: &RemoteAgentRef, input: Vec<u8>) -> MeshResult<Vec<u8>> {
        let host = self.host(&reference.location)?;
        let request = MessageEnvelope::new(MessageType::AgentCall, input)
            .with_agent_id(reference.id)
            .with_metadata(metadata_keys::INPUT_TYPE, reference.input_type.clone())
            .with_metadata(metadata_keys::OUTPUT_TYPE, reference.output_type.clone());
        let reply = self.exchange(&host, &request).await?;
        let reply = expect_reply(&request, reply, MessageType::AgentResponse, &reference.location)?;
        Ok(reply.payload)
    }
}

#[async_trait]
impl MeshProtocol for LocalProtocol {
    async fn send_agent(
        &self,
        agent: Arc<dyn ErasedAgent>,
        destination: &Location,
    ) -> MeshResult<RemoteAgentRef> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "send_agent");
        let result = self.send_agent_inner(agent, destination).await;
        if let Err(e) = &result {
            warn!(location = %destination, error = %e, "Local deploy failed");
        }
        timer.observe(result)
    }

    async fn call_remote_bytes(
        &self,
        reference: &RemoteAgentRef,
        input: Vec<u8>,
        timeout: Duration,
    ) -> MeshResult<Vec<u8>> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "call_remote_agent");
        let result = match tokio::time::timeout(timeout, self.call_inner(reference, input)).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout {
                operation: format!("call_remote_agent({})", reference.id),
                timeout,
            }
            .into()),
        };
        debug!(agent_id = %reference.id, ok = result.is_ok(), "Local call finished");
        timer.observe(result)
    }

    async fn get_remote_agent(&self, reference: &RemoteAgentRef) -> MeshResult<Option<AgentHandle>> {
        let handle = self
            .network
            .host(&reference.location)
            .and_then(|host| host.get(reference.id))
            .map(|agent| AgentHandle::new(reference.clone(), agent));
        Ok(handle)
    }

    async fn agent_exists(&self, reference: &RemoteAgentRef) -> MeshResult<bool> {
        let request =
            MessageEnvelope::new(MessageType::AgentGet, Vec::new()).with_agent_id(reference.id);
        let reply = self.send_and_receive(&reference.location, request.clone()).await?;
        match expect_reply(&request, reply, MessageType::AgentFound, &reference.location) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == agentmesh_core::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn undeploy_agent(&self, reference: &RemoteAgentRef) -> MeshResult<bool> {
        let host = self.host(&reference.location)?;
        Ok(host.undeploy(reference.id))
    }

    async fn send_and_receive(
        &self,
        location: &Location,
        envelope: MessageEnvelope,
    ) -> MeshResult<MessageEnvelope> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "send_and_receive");
        let result = match self.host(location) {
            Ok(host) => self.exchange(&host, &envelope).await,
            Err(e) => Err(e),
        };
        timer.observe(result)
    }

    async fn send(&self, location: &Location, envelope: MessageEnvelope) -> MeshResult<()> {
        let host = self.host(location)?;
        let request = decode_frame(&encode_frame(&envelope)?)?;
        tokio::spawn(async move {
            let reply = host.handle_envelope(request).await;
            debug!(reply_type = %reply.message_type, "Discarding fire-and-forget reply");
        });
        Ok(())
    }

    fn default_timeout(&self) -> Duration {
        self.call_timeout
    }
}
