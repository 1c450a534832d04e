//! agentmesh Test Utilities
//!
//! Shared test infrastructure for the agentmesh workspace:
//! - Proptest generators for directory and query types
//! - Fixture agents and a catalog that can rebuild them
//! - A single-node in-process mesh
//! - A recorder that captures operation telemetry
//! - Assertions on the error taxonomy

pub use agentmesh_core::{
    AgentId, AgentInfo, AgentMetadata, AgentQuery, AgentStatus, ErrorKind, Location, MeshError,
    MeshResult, OperationRecorder, ProtocolConfig, RemoteAgentRef, SharedRecorder,
};
pub use agentmesh_protocol::{
    Agent, AgentCatalog, AgentError, AgentHost, LocalNetwork, LocalProtocol,
};

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for agentmesh types.
    //!
    //! Capabilities, type tags and properties are drawn from small pools so
    //! that random queries actually hit random records.

    use super::*;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};
    use uuid::Uuid;

    pub const CAPABILITIES: &[&str] = &["nlp", "translation", "sentiment", "vision", "search", "code"];
    pub const TYPE_TAGS: &[&str] = &["string", "i64", "bool", "json"];

    pub fn arb_agent_id() -> impl Strategy<Value = AgentId> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_capability() -> impl Strategy<Value = String> {
        prop::sample::select(CAPABILITIES).prop_map(String::from)
    }

    pub fn arb_capabilities() -> impl Strategy<Value = BTreeSet<String>> {
        prop::collection::btree_set(arb_capability(), 0..4)
    }

    pub fn arb_type_tag() -> impl Strategy<Value = String> {
        prop::sample::select(TYPE_TAGS).prop_map(String::from)
    }

    pub fn arb_properties() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map(
            prop_oneof![Just("language".to_string()), Just("region".to_string())],
            prop_oneof![Just("en".to_string()), Just("fr".to_string())],
            0..2,
        )
    }

    pub fn arb_status() -> impl Strategy<Value = AgentStatus> {
        prop::sample::select(AgentStatus::ALL.to_vec())
    }

    pub fn arb_location() -> impl Strategy<Value = Location> {
        (
            prop_oneof![
                Just("localhost".to_string()),
                Just("127.0.0.1".to_string()),
                Just("mesh-a.internal".to_string()),
                Just("10.0.0.7".to_string()),
            ],
            1024u16..65535,
        )
            .prop_map(|(address, port)| Location::new(address, port))
    }

    pub fn arb_metadata() -> impl Strategy<Value = AgentMetadata> {
        (arb_capabilities(), arb_type_tag(), arb_type_tag(), arb_properties()).prop_map(
            |(capabilities, input_type, output_type, properties)| AgentMetadata {
                capabilities,
                input_type,
                output_type,
                properties,
                version: None,
            },
        )
    }

    /// A reference whose type tags agree with `metadata`.
    pub fn arb_reference_for(metadata: &AgentMetadata) -> impl Strategy<Value = RemoteAgentRef> {
        let input_type = metadata.input_type.clone();
        let output_type = metadata.output_type.clone();
        (arb_agent_id(), arb_location()).prop_map(move |(id, location)| {
            RemoteAgentRef::new(id, location, input_type.clone(), output_type.clone())
        })
    }

    pub fn arb_load_factor() -> impl Strategy<Value = Option<f64>> {
        prop::option::of(0.0f64..=1.0)
    }

    /// Queries with a limit high enough to never truncate.
    pub fn arb_query() -> impl Strategy<Value = AgentQuery> {
        (
            arb_capabilities(),
            prop::option::of(arb_type_tag()),
            prop::option::of(arb_type_tag()),
            arb_properties(),
            any::<bool>(),
        )
            .prop_map(|(capabilities, input_type, output_type, properties, only_active)| {
                AgentQuery {
                    capabilities,
                    input_type,
                    output_type,
                    properties,
                    limit: 1000,
                    only_active,
                }
            })
    }
}

// ============================================================================
// FIXTURE AGENTS
// ============================================================================

pub mod fixtures {
    //! Agents and registration helpers for common scenarios.

    use super::*;
    use agentmesh_core::new_agent_id;

    /// `string -> string`, upper-cases its input.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UppercaseAgent;

    #[async_trait]
    impl Agent for UppercaseAgent {
        type Input = String;
        type Output = String;

        fn kind(&self) -> &str {
            "uppercase"
        }

        async fn process(&self, input: String) -> Result<String, AgentError> {
            Ok(input.to_uppercase())
        }
    }

    /// `string -> string`, reverses its input.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ReverseAgent;

    #[async_trait]
    impl Agent for ReverseAgent {
        type Input = String;
        type Output = String;

        fn kind(&self) -> &str {
            "reverse"
        }

        async fn process(&self, input: String) -> Result<String, AgentError> {
            Ok(input.chars().rev().collect())
        }
    }

    /// `string -> u64`, counts whitespace-separated words.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WordCountAgent;

    #[async_trait]
    impl Agent for WordCountAgent {
        type Input = String;
        type Output = u64;

        fn kind(&self) -> &str {
            "word-count"
        }

        async fn process(&self, input: String) -> Result<u64, AgentError> {
            Ok(input.split_whitespace().count() as u64)
        }
    }

    /// `string -> string`, echoes its input after a delay.
    #[derive(Debug, Clone, Copy)]
    pub struct SlowAgent {
        pub delay: Duration,
    }

    impl SlowAgent {
        pub fn new(delay: Duration) -> Self {
            Self { delay }
        }
    }

    #[async_trait]
    impl Agent for SlowAgent {
        type Input = String;
        type Output = String;

        fn kind(&self) -> &str {
            "slow"
        }

        fn config(&self) -> serde_json::Value {
            serde_json::json!({ "delayMs": self.delay.as_millis() as u64 })
        }

        async fn process(&self, input: String) -> Result<String, AgentError> {
            tokio::time::sleep(self.delay).await;
            Ok(input)
        }
    }

    /// `string -> string`, always fails with its message.
    #[derive(Debug, Clone)]
    pub struct FailingAgent {
        pub message: String,
    }

    impl FailingAgent {
        pub fn new(message: impl Into<String>) -> Self {
            Self {
                message: message.into(),
            }
        }
    }

    #[async_trait]
    impl Agent for FailingAgent {
        type Input = String;
        type Output = String;

        fn kind(&self) -> &str {
            "failing"
        }

        fn config(&self) -> serde_json::Value {
            serde_json::json!({ "message": self.message })
        }

        async fn process(&self, _input: String) -> Result<String, AgentError> {
            Err(AgentError::new(self.message.clone()))
        }
    }

    /// Catalog that can rebuild every fixture agent from its descriptor.
    pub fn fixture_catalog() -> AgentCatalog {
        let catalog = AgentCatalog::new();
        catalog.register_default::<UppercaseAgent>("uppercase");
        catalog.register_default::<ReverseAgent>("reverse");
        catalog.register_default::<WordCountAgent>("word-count");
        catalog.register("slow", |config| {
            let millis = config
                .get("delayMs")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| AgentError::new("slow agent needs delayMs"))?;
            Ok(SlowAgent::new(Duration::from_millis(millis)))
        });
        catalog.register("failing", |config| {
            let message = config
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("failure");
            Ok(FailingAgent::new(message))
        });
        catalog
    }

    /// One host on a private in-process network.
    pub struct LocalNode {
        pub location: Location,
        pub host: Arc<AgentHost>,
        pub protocol: LocalProtocol,
    }

    impl LocalNode {
        pub fn new(port: u16) -> Self {
            Self::with_config(port, &ProtocolConfig::default())
        }

        pub fn with_config(port: u16, config: &ProtocolConfig) -> Self {
            let location = Location::localhost(port);
            let host = Arc::new(AgentHost::new(location.clone(), fixture_catalog()));
            let network = LocalNetwork::new();
            network.attach(Arc::clone(&host));
            Self {
                location,
                host,
                protocol: LocalProtocol::new(network, config),
            }
        }

        /// Attach another host on the same network.
        pub fn add_host(&self, port: u16) -> Arc<AgentHost> {
            let host = Arc::new(AgentHost::new(Location::localhost(port), fixture_catalog()));
            self.protocol.network().attach(Arc::clone(&host));
            host
        }
    }

    /// `string -> string` metadata with the given capabilities.
    pub fn text_metadata(capabilities: &[&str]) -> AgentMetadata {
        AgentMetadata::new("string", "string").with_capabilities(capabilities.iter().copied())
    }

    /// A reference at `localhost:8080` that no host knows about.
    pub fn unhosted_reference(metadata: &AgentMetadata) -> RemoteAgentRef {
        RemoteAgentRef::new(
            new_agent_id(),
            Location::localhost(8080),
            metadata.input_type.clone(),
            metadata.output_type.clone(),
        )
    }
}

// ============================================================================
// RECORDING TELEMETRY
// ============================================================================

/// One captured operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOperation {
    pub component: &'static str,
    pub operation: &'static str,
    pub success: bool,
}

/// Recorder that keeps every operation it sees.
#[derive(Debug, Default)]
pub struct RecordingRecorder {
    operations: Mutex<Vec<RecordedOperation>>,
}

impl RecordingRecorder {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn operations(&self) -> Vec<RecordedOperation> {
        self.operations
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    /// How many times `component`/`operation` was recorded with `success`.
    pub fn count(&self, component: &str, operation: &str, success: bool) -> usize {
        self.operations()
            .iter()
            .filter(|op| op.component == component && op.operation == operation && op.success == success)
            .count()
    }
}

impl OperationRecorder for RecordingRecorder {
    fn record(&self, component: &'static str, operation: &'static str, success: bool, _duration: Duration) {
        if let Ok(mut ops) = self.operations.lock() {
            ops.push(RecordedOperation {
                component,
                operation,
                success,
            });
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    /// Assert that `result` failed with an error of `kind`.
    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &MeshResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), kind, "wrong error kind for {}", e),
            Ok(v) => panic!("Expected {} error, got Ok({:?})", kind.as_str(), v),
        }
    }

    /// Assert that `infos` holds exactly the agents in `expected`, in any order.
    #[track_caller]
    pub fn assert_same_agents(infos: &[AgentInfo], expected: &[AgentId]) {
        let mut got: Vec<AgentId> = infos.iter().map(|i| i.agent_id).collect();
        let mut want = expected.to_vec();
        got.sort();
        want.sort();
        assert_eq!(got, want);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use agentmesh_protocol::{ErasedAgent, MeshProtocol, MeshProtocolExt, TypedAgent};
    use proptest::prelude::*;

    #[test]
    fn test_catalog_rebuilds_every_fixture() -> Result<(), AgentError> {
        let catalog = fixture_catalog();
        let agents = [
            TypedAgent::erase(UppercaseAgent),
            TypedAgent::erase(ReverseAgent),
            TypedAgent::erase(WordCountAgent),
            TypedAgent::erase(SlowAgent::new(Duration::from_millis(5))),
            TypedAgent::erase(FailingAgent::new("boom")),
        ];
        for agent in agents {
            let rebuilt = catalog.instantiate(&agent.descriptor())?;
            assert_eq!(rebuilt.descriptor(), agent.descriptor());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_local_node_runs_fixture_agents() -> MeshResult<()> {
        let node = LocalNode::new(7000);
        let reference = node.protocol.deploy(WordCountAgent, &node.location).await?;
        let words: u64 = node
            .protocol
            .call_remote_agent(&reference, &"one two three".to_string())
            .await?;
        assert_eq!(words, 3);
        assert!(node.protocol.agent_exists(&reference).await?);
        Ok(())
    }

    #[test]
    fn test_recording_recorder_counts() {
        let recorder = RecordingRecorder::default();
        recorder.record("directory", "register_agent", true, Duration::ZERO);
        recorder.record("directory", "register_agent", false, Duration::ZERO);
        assert_eq!(recorder.count("directory", "register_agent", true), 1);
        assert_eq!(recorder.operations().len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_generated_metadata_is_valid(metadata in generators::arb_metadata()) {
            prop_assert!(metadata.validate().is_ok());
        }

        #[test]
        fn prop_generated_query_is_valid(query in generators::arb_query()) {
            prop_assert!(query.validate(1000).is_ok());
        }
    }
}
