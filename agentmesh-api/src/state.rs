//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use agentmesh_core::{Location, MeshConfig, SharedRecorder};
use agentmesh_directory::{AgentDirectory, InMemoryDirectory};
use agentmesh_events::EventFeed;
use agentmesh_protocol::{AgentCatalog, AgentHost};

/// Everything one node serves: its directory with the event feed behind it,
/// the agents deployed here and the mesh configuration it was started with.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn AgentDirectory>,
    pub events: EventFeed,
    pub host: Arc<AgentHost>,
    pub mesh_config: Arc<MeshConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        directory: Arc<dyn AgentDirectory>,
        events: EventFeed,
        host: Arc<AgentHost>,
        mesh_config: MeshConfig,
    ) -> Self {
        Self {
            directory,
            events,
            host,
            mesh_config: Arc::new(mesh_config),
            start_time: Instant::now(),
        }
    }

    /// Build an in-memory directory and an agent host at `location`, both
    /// reporting to `recorder`.
    ///
    /// Spawns the event feed's fan-out task, so it must run inside a Tokio
    /// runtime.
    pub fn build(
        mesh_config: MeshConfig,
        location: Location,
        catalog: AgentCatalog,
        recorder: SharedRecorder,
    ) -> Self {
        let events = EventFeed::new(&mesh_config.events);
        let directory = InMemoryDirectory::new(mesh_config.directory.clone(), events.clone())
            .with_recorder(recorder.clone());
        let host = AgentHost::new(location, catalog).with_recorder(recorder);
        Self::new(Arc::new(directory), events, Arc::new(host), mesh_config)
    }

    /// Upper bound for query limits accepted over HTTP.
    pub fn max_query_limit(&self) -> usize {
        self.mesh_config.directory.max_query_limit
    }
}

crate::impl_from_ref!(Arc<dyn AgentDirectory>, directory);
crate::impl_from_ref!(Arc<AgentHost>, host);
crate::impl_from_ref!(Arc<MeshConfig>, mesh_config);
crate::impl_from_ref!(Instant, start_time);
