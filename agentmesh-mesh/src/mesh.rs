//! The mesh facade.

use crate::workflow::{self, Workflow};
use agentmesh_core::{
    AgentId, AgentInfo, AgentMetadata, AgentQuery, AgentStatus, DirectoryError, Location,
    MeshError, MeshResult, RemoteAgentRef, ValidationError,
};
use agentmesh_directory::{matching, AgentDirectory};
use agentmesh_protocol::{
    codec::{self, check_type_tag},
    Agent, AgentHandle, ErasedAgent, MeshProtocol, MeshType, TypedAgent,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Candidates examined per workflow step.
const WORKFLOW_CANDIDATES: usize = 100;

/// A discovered agent plus a local handle when the transport can provide one.
#[derive(Debug, Clone)]
pub struct ResolvedAgent {
    pub info: AgentInfo,
    pub handle: Option<AgentHandle>,
}

impl ResolvedAgent {
    pub fn reference(&self) -> &RemoteAgentRef {
        &self.info.reference
    }
}

/// Directory plus protocol.
///
/// Every operation is a sequence of directory and protocol calls; none of
/// them is transactional.
#[derive(Clone)]
pub struct Mesh {
    directory: Arc<dyn AgentDirectory>,
    protocol: Arc<dyn MeshProtocol>,
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("agents", &self.directory.agent_count())
            .field("default_timeout", &self.protocol.default_timeout())
            .finish()
    }
}

impl Mesh {
    pub fn new(directory: Arc<dyn AgentDirectory>, protocol: Arc<dyn MeshProtocol>) -> Self {
        Self {
            directory,
            protocol,
        }
    }

    pub fn directory(&self) -> &Arc<dyn AgentDirectory> {
        &self.directory
    }

    pub fn protocol(&self) -> &Arc<dyn MeshProtocol> {
        &self.protocol
    }

    // ========================================================================
    // DEPLOYMENT
    // ========================================================================

    /// Deploy a typed agent and register it.
    pub async fn deploy_and_register<A: Agent>(
        &self,
        agent: A,
        metadata: AgentMetadata,
        destination: &Location,
    ) -> MeshResult<AgentInfo> {
        self.deploy_erased_and_register(TypedAgent::erase(agent), metadata, destination)
            .await
    }

    /// Send the agent, register it as `Initializing`, then mark it `Active`.
    ///
    /// If a step after the send fails, the agent stays deployed but is not
    /// discoverable. That window is logged and the error returned; nothing is
    /// rolled back.
    pub async fn deploy_erased_and_register(
        &self,
        agent: Arc<dyn ErasedAgent>,
        metadata: AgentMetadata,
        destination: &Location,
    ) -> MeshResult<AgentInfo> {
        check_declared_types(agent.as_ref(), &metadata)?;
        metadata.validate()?;

        let reference = self.protocol.send_agent(agent, destination).await?;
        let agent_id = reference.id;

        if let Err(e) =
            self.directory
                .register_with_status(reference, metadata, AgentStatus::Initializing)
        {
            warn!(
                agent_id = %agent_id,
                location = %destination,
                error = %e,
                "Agent deployed but registration failed; it is reachable but not discoverable"
            );
            return Err(e);
        }

        match self.directory.update_agent_status(agent_id, AgentStatus::Active) {
            Ok(info) => {
                info!(agent_id = %agent_id, location = %destination, "Agent deployed and registered");
                Ok(info)
            }
            Err(e) => {
                warn!(
                    agent_id = %agent_id,
                    error = %e,
                    "Agent registered but activation failed; it is not discoverable by active queries"
                );
                Err(e)
            }
        }
    }

    /// Unregister, then undeploy. Returns whether anything was removed.
    pub async fn undeploy_and_unregister(&self, agent_id: AgentId) -> MeshResult<bool> {
        let Some(info) = self.directory.unregister_agent(agent_id) else {
            debug!(agent_id = %agent_id, "Nothing to undeploy");
            return Ok(false);
        };
        let undeployed = self.protocol.undeploy_agent(&info.reference).await?;
        if !undeployed {
            warn!(agent_id = %agent_id, location = %info.reference.location, "Registered agent was not deployed");
        }
        Ok(true)
    }

    // ========================================================================
    // LOOKUP
    // ========================================================================

    /// Active agents declaring all of `capabilities`, newest first.
    pub fn find_agents_by_capabilities<I, S>(&self, capabilities: I) -> Vec<AgentInfo>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directory
            .discover_agents(&AgentQuery::for_capabilities(capabilities))
    }

    /// Active agents with the given input and output types, newest first.
    pub fn find_agents_by_types(&self, input_type: &str, output_type: &str) -> Vec<AgentInfo> {
        let query = AgentQuery::new()
            .with_input_type(input_type)
            .with_output_type(output_type);
        self.directory.discover_agents(&query)
    }

    /// First agent declaring all of `capabilities`, with a local handle when
    /// the protocol can materialize one.
    pub async fn get_agent_by_capabilities<I, S>(
        &self,
        capabilities: I,
    ) -> MeshResult<Option<ResolvedAgent>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let query = AgentQuery::for_capabilities(capabilities).with_limit(1);
        let Some(info) = self.directory.discover_agents(&query).into_iter().next() else {
            return Ok(None);
        };
        let handle = self.protocol.get_remote_agent(&info.reference).await?;
        Ok(Some(ResolvedAgent { info, handle }))
    }

    /// Matching agent with the lowest load factor. Unreported load sorts last.
    pub fn get_least_loaded_agent(&self, query: &AgentQuery) -> Option<AgentInfo> {
        self.directory
            .discover_agents(query)
            .into_iter()
            .min_by(matching::load_order)
    }

    // ========================================================================
    // INVOCATION
    // ========================================================================

    /// Try matching agents in ascending load order until one answers.
    ///
    /// Only `NotFound`, `Transport` and `Timeout` move on to the next
    /// candidate; any other error is returned at once. Candidates whose type
    /// tags differ from `I`/`O` are skipped.
    pub async fn call_with_failover<I, O>(&self, query: &AgentQuery, input: &I) -> MeshResult<O>
    where
        I: MeshType,
        O: MeshType,
    {
        self.call_with_failover_timeout(query, input, self.protocol.default_timeout())
            .await
    }

    pub async fn call_with_failover_timeout<I, O>(
        &self,
        query: &AgentQuery,
        input: &I,
        timeout: Duration,
    ) -> MeshResult<O>
    where
        I: MeshType,
        O: MeshType,
    {
        let query = query
            .clone()
            .with_input_type(I::type_tag())
            .with_output_type(O::type_tag());
        let mut candidates = self.directory.discover_agents(&query);
        candidates.sort_by(matching::load_order);

        let payload = codec::encode(input)?;
        let mut last_error = None;
        for candidate in &candidates {
            let reference = &candidate.reference;
            match self
                .protocol
                .call_remote_bytes(reference, payload.clone(), timeout)
                .await
            {
                Ok(output) => return Ok(codec::decode(&output)?),
                Err(e) if e.kind().is_retryable_elsewhere() => {
                    warn!(agent_id = %reference.id, error = %e, "Candidate failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DirectoryError::NoMatchingAgent {
                query: describe(&query),
            }
            .into()
        }))
    }

    // ========================================================================
    // WORKFLOWS
    // ========================================================================

    /// Chain of active agents, one per capability set, where each step's
    /// output type equals the next step's input type.
    pub fn get_workflow(&self, steps: &[BTreeSet<String>]) -> Option<Workflow> {
        workflow::resolve(self.directory.as_ref(), steps, WORKFLOW_CANDIDATES)
    }

    /// Feed `input` through every step of `workflow`.
    pub async fn run_workflow<I, O>(&self, workflow: &Workflow, input: &I) -> MeshResult<O>
    where
        I: MeshType,
        O: MeshType,
    {
        let (Some(input_type), Some(output_type)) = (workflow.input_type(), workflow.output_type())
        else {
            return Err(ValidationError::InvalidValue {
                field: "workflow".to_string(),
                reason: "workflow has no steps".to_string(),
            }
            .into());
        };
        check_type_tag(input_type, &I::type_tag())?;
        check_type_tag(output_type, &O::type_tag())?;

        let timeout = self.protocol.default_timeout();
        let mut payload = codec::encode(input)?;
        for reference in workflow.references() {
            debug!(agent_id = %reference.id, "Running workflow step");
            payload = self
                .protocol
                .call_remote_bytes(reference, payload, timeout)
                .await?;
        }
        Ok(codec::decode(&payload)?)
    }
}

fn check_declared_types(agent: &dyn ErasedAgent, metadata: &AgentMetadata) -> MeshResult<()> {
    for (field, declared, actual) in [
        ("inputType", &metadata.input_type, agent.input_type()),
        ("outputType", &metadata.output_type, agent.output_type()),
    ] {
        if *declared != actual {
            return Err(MeshError::from(ValidationError::InvalidValue {
                field: field.to_string(),
                reason: format!("metadata declares {}, agent declares {}", declared, actual),
            }));
        }
    }
    Ok(())
}

fn describe(query: &AgentQuery) -> String {
    format!(
        "capabilities {:?}, {} -> {}",
        query.capabilities,
        query.input_type.as_deref().unwrap_or("*"),
        query.output_type.as_deref().unwrap_or("*")
    )
}
