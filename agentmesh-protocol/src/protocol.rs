//! The protocol contract and its typed extension.

use crate::agent::{Agent, ErasedAgent, ProcessError, TypedAgent};
use crate::codec::{self, check_type_tag, MeshType};
use agentmesh_core::{
    Location, MeshError, MeshResult, MessageEnvelope, ProtocolError, RemoteAgentRef,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Transport-level mesh operations.
///
/// No operation retries; retry policy belongs to the caller.
#[async_trait]
pub trait MeshProtocol: Send + Sync {
    /// Ship `agent` to `destination` and return a reference with a fresh id.
    async fn send_agent(
        &self,
        agent: Arc<dyn ErasedAgent>,
        destination: &Location,
    ) -> MeshResult<RemoteAgentRef>;

    /// Send an encoded input to `reference` and return the encoded output.
    ///
    /// Fails with `Timeout` once `timeout` elapses; the in-flight request is
    /// dropped.
    async fn call_remote_bytes(
        &self,
        reference: &RemoteAgentRef,
        input: Vec<u8>,
        timeout: Duration,
    ) -> MeshResult<Vec<u8>>;

    /// A local handle, when this transport can materialize one.
    async fn get_remote_agent(&self, reference: &RemoteAgentRef) -> MeshResult<Option<AgentHandle>>;

    /// Ask the remote side whether the agent is deployed.
    async fn agent_exists(&self, reference: &RemoteAgentRef) -> MeshResult<bool>;

    /// Remove the agent at its location. Returns whether it existed.
    async fn undeploy_agent(&self, reference: &RemoteAgentRef) -> MeshResult<bool>;

    /// Raw request/response.
    async fn send_and_receive(
        &self,
        location: &Location,
        envelope: MessageEnvelope,
    ) -> MeshResult<MessageEnvelope>;

    /// Fire-and-forget.
    async fn send(&self, location: &Location, envelope: MessageEnvelope) -> MeshResult<()>;

    /// Timeout used by calls that do not pass one.
    fn default_timeout(&self) -> Duration;
}

/// Typed conveniences over any [`MeshProtocol`].
#[async_trait]
pub trait MeshProtocolExt: MeshProtocol {
    /// Deploy a typed agent.
    async fn deploy<A: Agent>(&self, agent: A, destination: &Location) -> MeshResult<RemoteAgentRef> {
        self.send_agent(TypedAgent::erase(agent), destination).await
    }

    /// Typed call with the protocol's default timeout.
    async fn call_remote_agent<I, O>(&self, reference: &RemoteAgentRef, input: &I) -> MeshResult<O>
    where
        I: MeshType,
        O: MeshType,
    {
        self.call_remote_agent_with_timeout(reference, input, self.default_timeout())
            .await
    }

    /// Typed call; checks `I` and `O` against the reference's tags first.
    async fn call_remote_agent_with_timeout<I, O>(
        &self,
        reference: &RemoteAgentRef,
        input: &I,
        timeout: Duration,
    ) -> MeshResult<O>
    where
        I: MeshType,
        O: MeshType,
    {
        check_type_tag(&reference.input_type, &I::type_tag())?;
        check_type_tag(&reference.output_type, &O::type_tag())?;
        let payload = codec::encode(input)?;
        let output = self.call_remote_bytes(reference, payload, timeout).await?;
        Ok(codec::decode(&output)?)
    }
}

impl<P: MeshProtocol + ?Sized> MeshProtocolExt for P {}

/// In-process handle to a deployed agent.
#[derive(Clone)]
pub struct AgentHandle {
    reference: RemoteAgentRef,
    agent: Arc<dyn ErasedAgent>,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("reference", &self.reference)
            .finish()
    }
}

impl AgentHandle {
    pub fn new(reference: RemoteAgentRef, agent: Arc<dyn ErasedAgent>) -> Self {
        Self { reference, agent }
    }

    pub fn reference(&self) -> &RemoteAgentRef {
        &self.reference
    }

    pub fn erased(&self) -> &Arc<dyn ErasedAgent> {
        &self.agent
    }

    /// The concrete agent, when it is an `A`.
    pub fn downcast<A: Agent>(&self) -> Option<&A> {
        self.agent.as_any().downcast_ref::<A>()
    }

    /// Invoke directly, without any transport.
    pub async fn call<I, O>(&self, input: &I) -> MeshResult<O>
    where
        I: MeshType,
        O: MeshType,
    {
        check_type_tag(&self.reference.input_type, &I::type_tag())?;
        check_type_tag(&self.reference.output_type, &O::type_tag())?;
        let output = self
            .agent
            .process_bytes(&codec::encode(input)?)
            .await
            .map_err(|e| match e {
                ProcessError::Serialization(e) => MeshError::from(e),
                ProcessError::Agent(e) => ProtocolError::Remote {
                    agent_id: self.reference.id,
                    reason: e.message,
                }
                .into(),
            })?;
        Ok(codec::decode(&output)?)
    }
}
