//! Concurrent in-memory directory backed by a sharded map.

use crate::directory::AgentDirectory;
use crate::matching::{discovery_order, matches};
use agentmesh_core::{
    AgentId, AgentInfo, AgentMetadata, AgentQuery, AgentStatus, DirectoryConfig, DirectoryError,
    DirectoryEvent, DuplicatePolicy, MeshError, MeshResult, NoopRecorder, OperationTimer, RemoteAgentRef,
    SharedRecorder,
};
use agentmesh_events::{EventFeed, EventSubscription};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

const COMPONENT: &str = "directory";

/// In-memory [`AgentDirectory`].
///
/// Each record lives in one shard of a `DashMap`. Single-key
/// read-modify-write happens under that shard's lock, and the resulting
/// event is published before the lock is released, so per-agent event
/// order always matches mutation order.
pub struct InMemoryDirectory {
    agents: DashMap<AgentId, AgentInfo>,
    config: DirectoryConfig,
    events: EventFeed,
    recorder: SharedRecorder,
}

impl std::fmt::Debug for InMemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDirectory")
            .field("agents", &self.agents.len())
            .field("config", &self.config)
            .finish()
    }
}

impl InMemoryDirectory {
    pub fn new(config: DirectoryConfig, events: EventFeed) -> Self {
        Self {
            agents: DashMap::new(),
            config,
            events,
            recorder: NoopRecorder::shared(),
        }
    }

    /// Directory with default config and a fresh event feed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_defaults() -> Self {
        Self::new(
            DirectoryConfig::default(),
            EventFeed::new(&Default::default()),
        )
    }

    pub fn with_recorder(mut self, recorder: SharedRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn events(&self) -> &EventFeed {
        &self.events
    }

    /// Replace one record under its shard lock.
    ///
    /// `apply` computes the new record and the event to publish from the
    /// current one.
    fn replace<F>(&self, agent_id: AgentId, apply: F) -> MeshResult<AgentInfo>
    where
        F: FnOnce(&AgentInfo) -> MeshResult<(AgentInfo, Option<DirectoryEvent>)>,
    {
        let mut entry = self
            .agents
            .get_mut(&agent_id)
            .ok_or(DirectoryError::NotFound { agent_id })?;
        let (updated, event) = apply(entry.value())?;
        *entry.value_mut() = updated.clone();
        if let Some(event) = event {
            self.events.publish(event);
        }
        drop(entry);
        Ok(updated)
    }

    fn insert(&self, info: AgentInfo) -> MeshResult<AgentInfo> {
        let agent_id = info.agent_id;
        let event = DirectoryEvent::AgentRegistered {
            agent_id,
            info: info.clone(),
            timestamp: info.registered_at,
        };

        match self.agents.entry(agent_id) {
            Entry::Occupied(mut occupied) => match self.config.duplicate_policy {
                DuplicatePolicy::Reject => {
                    return Err(DirectoryError::AlreadyRegistered { agent_id }.into());
                }
                DuplicatePolicy::Overwrite => {
                    occupied.insert(info.clone());
                    self.events.publish(event);
                    info!(agent_id = %agent_id, "Agent registration overwritten");
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(info.clone());
                self.events.publish(event);
            }
        }
        Ok(info)
    }

    fn register_validated(
        &self,
        reference: RemoteAgentRef,
        metadata: AgentMetadata,
        status: AgentStatus,
    ) -> MeshResult<AgentInfo> {
        metadata.validate()?;
        let location = reference.location.clone();
        let info = self.insert(AgentInfo::new(reference, metadata, status))?;
        info!(
            agent_id = %info.agent_id,
            location = %location,
            status = %info.status,
            capabilities = ?info.metadata.capabilities,
            "Agent registered"
        );
        Ok(info)
    }
}

impl AgentDirectory for InMemoryDirectory {
    fn register_agent(
        &self,
        reference: RemoteAgentRef,
        metadata: AgentMetadata,
    ) -> MeshResult<AgentInfo> {
        self.register_with_status(reference, metadata, self.config.initial_status)
    }

    fn register_with_status(
        &self,
        reference: RemoteAgentRef,
        metadata: AgentMetadata,
        status: AgentStatus,
    ) -> MeshResult<AgentInfo> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "register_agent");
        timer.observe(self.register_validated(reference, metadata, status))
    }

    fn unregister_agent(&self, agent_id: AgentId) -> Option<AgentInfo> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "unregister_agent");
        // Publish while the shard lock is held so a concurrent re-registration
        // of the same id cannot overtake this event.
        let removed = self
            .agents
            .remove_if(&agent_id, |_, _| {
                self.events.publish(DirectoryEvent::AgentUnregistered {
                    agent_id,
                    timestamp: Utc::now(),
                });
                true
            })
            .map(|(_, info)| info);
        timer.finish(true);

        match &removed {
            Some(_) => info!(agent_id = %agent_id, "Agent unregistered"),
            None => debug!(agent_id = %agent_id, "Unregister of unknown agent ignored"),
        }
        removed
    }

    fn discover_agents(&self, query: &AgentQuery) -> Vec<AgentInfo> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "discover_agents");
        let limit = query.effective_limit(self.config.max_query_limit);

        let mut found: Vec<AgentInfo> = self
            .agents
            .iter()
            .filter(|entry| matches(query, entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        let matched = found.len();
        found.sort_by(discovery_order);
        found.truncate(limit);

        timer.finish(true);
        debug!(
            capabilities = ?query.capabilities,
            matched,
            returned = found.len(),
            limit,
            "Discovery query"
        );
        found
    }

    fn get_agent_info(&self, agent_id: AgentId) -> Option<AgentInfo> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "get_agent_info");
        let info = self.agents.get(&agent_id).map(|entry| entry.value().clone());
        timer.finish(true);
        info
    }

    fn update_agent_status(
        &self,
        agent_id: AgentId,
        status: AgentStatus,
    ) -> MeshResult<AgentInfo> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "update_agent_status");
        let result = self.replace(agent_id, |current| {
            let updated = current.with_status(status);
            let event = DirectoryEvent::AgentStatusChanged {
                agent_id,
                old_status: current.status,
                new_status: status,
                timestamp: updated.last_updated,
            };
            Ok((updated, Some(event)))
        });
        if let Ok(info) = &result {
            info!(agent_id = %agent_id, status = %info.status, "Agent status updated");
        }
        timer.observe(result)
    }

    fn update_agent_metadata(
        &self,
        agent_id: AgentId,
        metadata: AgentMetadata,
    ) -> MeshResult<AgentInfo> {
        let timer =
            OperationTimer::start(self.recorder.as_ref(), COMPONENT, "update_agent_metadata");
        let result = metadata
            .validate()
            .map_err(MeshError::from)
            .and_then(|()| {
                self.replace(agent_id, |current| {
                    let updated = current.with_metadata(metadata);
                    let event = DirectoryEvent::AgentMetadataUpdated {
                        agent_id,
                        old_metadata: current.metadata.clone(),
                        new_metadata: updated.metadata.clone(),
                        timestamp: updated.last_updated,
                    };
                    Ok((updated, Some(event)))
                })
            });
        if result.is_ok() {
            info!(agent_id = %agent_id, "Agent metadata updated");
        }
        timer.observe(result)
    }

    fn update_agent_load_factor(
        &self,
        agent_id: AgentId,
        load_factor: Option<f64>,
    ) -> MeshResult<AgentInfo> {
        let timer =
            OperationTimer::start(self.recorder.as_ref(), COMPONENT, "update_agent_load_factor");
        let result = self.replace(agent_id, |current| {
            let updated = current.with_load_factor(load_factor)?;
            let event = DirectoryEvent::AgentLoadChanged {
                agent_id,
                old_load: current.load_factor,
                new_load: load_factor,
                timestamp: updated.last_updated,
            };
            Ok((updated, Some(event)))
        });
        if result.is_ok() {
            debug!(agent_id = %agent_id, load_factor = ?load_factor, "Agent load updated");
        }
        timer.observe(result)
    }

    fn heartbeat(&self, agent_id: AgentId) -> MeshResult<AgentInfo> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "heartbeat");
        let result = self.replace(agent_id, |current| Ok((current.touched(), None)));
        timer.observe(result)
    }

    fn subscribe_to_events(&self) -> EventSubscription {
        self.events.subscribe()
    }

    fn get_all_agents(&self) -> Vec<AgentInfo> {
        let mut all: Vec<AgentInfo> = self
            .agents
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(discovery_order);
        all
    }

    fn agent_count(&self) -> usize {
        self.agents.len()
    }

    fn active_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|entry| entry.value().is_active())
            .count()
    }
}
