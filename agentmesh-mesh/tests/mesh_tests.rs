//! Mesh facade over an in-memory directory and the in-process transport.

use agentmesh_core::{
    AgentQuery, AgentStatus, DirectoryConfig, DirectoryEvent, ErrorKind, MeshResult,
};
use agentmesh_directory::{AgentDirectory, EventFeed, InMemoryDirectory};
use agentmesh_mesh::Mesh;
use agentmesh_protocol::MeshProtocol;
use agentmesh_test_utils::assertions::{assert_kind, assert_same_agents};
use agentmesh_test_utils::fixtures::{
    text_metadata, unhosted_reference, FailingAgent, LocalNode, ReverseAgent, SlowAgent,
    UppercaseAgent, WordCountAgent,
};
use agentmesh_test_utils::{AgentMetadata, RecordingRecorder};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    node: LocalNode,
    directory: Arc<InMemoryDirectory>,
    mesh: Mesh,
}

fn harness(port: u16) -> Harness {
    let node = LocalNode::new(port);
    let directory = Arc::new(InMemoryDirectory::new(
        DirectoryConfig::default(),
        EventFeed::with_capacity(64),
    ));
    let mesh = Mesh::new(directory.clone(), Arc::new(node.protocol.clone()));
    Harness {
        node,
        directory,
        mesh,
    }
}

fn caps(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_deploy_and_register_makes_agent_discoverable() -> MeshResult<()> {
    let h = harness(7001);
    let info = h
        .mesh
        .deploy_and_register(UppercaseAgent, text_metadata(&["text", "upper"]), &h.node.location)
        .await?;

    assert_eq!(info.status, AgentStatus::Active);
    assert_eq!(info.agent_id, info.reference.id);
    assert!(h.node.host.contains(info.agent_id));

    let found = h.mesh.find_agents_by_capabilities(["upper"]);
    assert_same_agents(&found, &[info.agent_id]);
    Ok(())
}

#[tokio::test]
async fn test_deploy_publishes_registered_before_activation() -> MeshResult<()> {
    let h = harness(7002);
    let mut events = h.directory.subscribe_to_events();

    let info = h
        .mesh
        .deploy_and_register(UppercaseAgent, text_metadata(&["upper"]), &h.node.location)
        .await?;

    match events.recv().await {
        Some(DirectoryEvent::AgentRegistered { agent_id, info: registered, .. }) => {
            assert_eq!(agent_id, info.agent_id);
            assert_eq!(registered.status, AgentStatus::Initializing);
        }
        other => panic!("expected AgentRegistered, got {:?}", other),
    }
    match events.recv().await {
        Some(DirectoryEvent::AgentStatusChanged {
            old_status,
            new_status,
            ..
        }) => {
            assert_eq!(old_status, AgentStatus::Initializing);
            assert_eq!(new_status, AgentStatus::Active);
        }
        other => panic!("expected AgentStatusChanged, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_deploy_rejects_metadata_that_disagrees_with_agent() {
    let h = harness(7003);
    let metadata = AgentMetadata::new("i64", "string").with_capability("upper");

    let result = h
        .mesh
        .deploy_and_register(UppercaseAgent, metadata, &h.node.location)
        .await;

    assert_kind(&result, ErrorKind::Validation);
    assert_eq!(h.node.host.deployed_count(), 0);
    assert_eq!(h.directory.agent_count(), 0);
}

#[tokio::test]
async fn test_find_agents_by_types() -> MeshResult<()> {
    let h = harness(7004);
    let upper = h
        .mesh
        .deploy_and_register(UppercaseAgent, text_metadata(&["upper"]), &h.node.location)
        .await?;
    let count = h
        .mesh
        .deploy_and_register(
            WordCountAgent,
            AgentMetadata::new("string", "u64").with_capability("count"),
            &h.node.location,
        )
        .await?;

    assert_same_agents(&h.mesh.find_agents_by_types("string", "string"), &[upper.agent_id]);
    assert_same_agents(&h.mesh.find_agents_by_types("string", "u64"), &[count.agent_id]);
    assert!(h.mesh.find_agents_by_types("u64", "string").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_get_agent_by_capabilities_returns_local_handle() -> MeshResult<()> {
    let h = harness(7005);
    h.mesh
        .deploy_and_register(ReverseAgent, text_metadata(&["reverse"]), &h.node.location)
        .await?;

    let resolved = h.mesh.get_agent_by_capabilities(["reverse"]).await?;
    let handle = resolved.and_then(|r| r.handle);
    let Some(handle) = handle else {
        panic!("in-process transport should materialize a handle");
    };
    let reversed: String = handle.call(&"mesh".to_string()).await?;
    assert_eq!(reversed, "hsem");

    assert!(h.mesh.get_agent_by_capabilities(["vision"]).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_least_loaded_agent() -> MeshResult<()> {
    let h = harness(7006);
    let mut ids = Vec::new();
    for load in [Some(0.9), None, Some(0.2)] {
        let info = h
            .mesh
            .deploy_and_register(UppercaseAgent, text_metadata(&["upper"]), &h.node.location)
            .await?;
        h.directory.update_agent_load_factor(info.agent_id, load)?;
        ids.push(info.agent_id);
    }

    let least = h
        .mesh
        .get_least_loaded_agent(&AgentQuery::for_capabilities(["upper"]));
    assert_eq!(least.map(|i| i.agent_id), Some(ids[2]));
    Ok(())
}

#[tokio::test]
async fn test_failover_skips_unreachable_agent() -> MeshResult<()> {
    let h = harness(7007);
    let metadata = text_metadata(&["upper"]);

    // Least loaded candidate points at an agent no host knows about.
    let ghost = unhosted_reference(&metadata);
    h.directory.register_agent(ghost.clone(), metadata.clone())?;
    h.directory.update_agent_load_factor(ghost.id, Some(0.0))?;

    let real = h
        .mesh
        .deploy_and_register(UppercaseAgent, metadata, &h.node.location)
        .await?;
    h.directory.update_agent_load_factor(real.agent_id, Some(0.5))?;

    let output: String = h
        .mesh
        .call_with_failover(&AgentQuery::for_capabilities(["upper"]), &"failover".to_string())
        .await?;
    assert_eq!(output, "FAILOVER");
    Ok(())
}

#[tokio::test]
async fn test_failover_stops_on_agent_failure() -> MeshResult<()> {
    let h = harness(7008);
    let failing = h
        .mesh
        .deploy_and_register(FailingAgent::new("broken"), text_metadata(&["upper"]), &h.node.location)
        .await?;
    h.directory.update_agent_load_factor(failing.agent_id, Some(0.1))?;
    let healthy = h
        .mesh
        .deploy_and_register(UppercaseAgent, text_metadata(&["upper"]), &h.node.location)
        .await?;
    h.directory.update_agent_load_factor(healthy.agent_id, Some(0.9))?;

    let result: MeshResult<String> = h
        .mesh
        .call_with_failover(&AgentQuery::for_capabilities(["upper"]), &"x".to_string())
        .await;
    assert_kind(&result, ErrorKind::Internal);
    Ok(())
}

#[tokio::test]
async fn test_failover_retries_after_timeout() -> MeshResult<()> {
    let h = harness(7009);
    let slow = h
        .mesh
        .deploy_and_register(
            SlowAgent::new(Duration::from_millis(500)),
            text_metadata(&["echo"]),
            &h.node.location,
        )
        .await?;
    h.directory.update_agent_load_factor(slow.agent_id, Some(0.0))?;
    let fast = h
        .mesh
        .deploy_and_register(
            SlowAgent::new(Duration::from_millis(1)),
            text_metadata(&["echo"]),
            &h.node.location,
        )
        .await?;
    h.directory.update_agent_load_factor(fast.agent_id, Some(0.5))?;

    let output: String = h
        .mesh
        .call_with_failover_timeout(
            &AgentQuery::for_capabilities(["echo"]),
            &"ping".to_string(),
            Duration::from_millis(100),
        )
        .await?;
    assert_eq!(output, "ping");
    Ok(())
}

#[tokio::test]
async fn test_failover_without_candidates_is_not_found() {
    let h = harness(7010);
    let result: MeshResult<String> = h
        .mesh
        .call_with_failover(&AgentQuery::for_capabilities(["nobody"]), &"x".to_string())
        .await;
    assert_kind(&result, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_workflow_chains_exact_types() -> MeshResult<()> {
    let h = harness(7011);
    h.mesh
        .deploy_and_register(UppercaseAgent, text_metadata(&["upper"]), &h.node.location)
        .await?;
    h.mesh
        .deploy_and_register(
            WordCountAgent,
            AgentMetadata::new("string", "u64").with_capability("count"),
            &h.node.location,
        )
        .await?;

    let workflow = h.mesh.get_workflow(&[caps(&["upper"]), caps(&["count"])]);
    let Some(workflow) = workflow else {
        panic!("upper -> count should resolve");
    };
    assert_eq!(workflow.len(), 2);
    assert_eq!(workflow.input_type(), Some("string"));
    assert_eq!(workflow.output_type(), Some("u64"));

    let words: u64 = h.mesh.run_workflow(&workflow, &"one two three".to_string()).await?;
    assert_eq!(words, 3);

    // u64 output cannot feed a string input.
    assert!(h.mesh.get_workflow(&[caps(&["count"]), caps(&["upper"])]).is_none());
    assert!(h.mesh.get_workflow(&[]).is_none());
    Ok(())
}

#[tokio::test]
async fn test_workflow_backtracks_to_a_chain_that_fits() -> MeshResult<()> {
    let h = harness(7012);
    // Least loaded "first" agent outputs u64, which nothing downstream accepts.
    let dead_end = h
        .mesh
        .deploy_and_register(
            WordCountAgent,
            AgentMetadata::new("string", "u64").with_capability("first"),
            &h.node.location,
        )
        .await?;
    h.directory.update_agent_load_factor(dead_end.agent_id, Some(0.0))?;
    let good = h
        .mesh
        .deploy_and_register(ReverseAgent, text_metadata(&["first"]), &h.node.location)
        .await?;
    h.directory.update_agent_load_factor(good.agent_id, Some(0.9))?;
    h.mesh
        .deploy_and_register(UppercaseAgent, text_metadata(&["second"]), &h.node.location)
        .await?;

    let Some(workflow) = h.mesh.get_workflow(&[caps(&["first"]), caps(&["second"])]) else {
        panic!("reverse -> upper should resolve");
    };
    assert_eq!(workflow.steps()[0].agent_id, good.agent_id);

    let output: String = h.mesh.run_workflow(&workflow, &"abc".to_string()).await?;
    assert_eq!(output, "CBA");
    Ok(())
}

#[tokio::test]
async fn test_workflow_with_dead_final_step_searches_each_state_once() -> MeshResult<()> {
    let recorder = RecordingRecorder::shared();
    let directory = Arc::new(
        InMemoryDirectory::new(DirectoryConfig::default(), EventFeed::with_capacity(16))
            .with_recorder(recorder.clone()),
    );
    let node = LocalNode::new(7015);
    let mesh = Mesh::new(directory.clone(), Arc::new(node.protocol.clone()));

    for step in ["a", "b", "c"] {
        for _ in 0..100 {
            let metadata = text_metadata(&[step]);
            directory.register_agent(unhosted_reference(&metadata), metadata)?;
        }
    }
    // Nothing at the last step accepts a string.
    let metadata = AgentMetadata::new("json", "json").with_capability("d");
    directory.register_agent(unhosted_reference(&metadata), metadata)?;

    let steps = [caps(&["a"]), caps(&["b"]), caps(&["c"]), caps(&["d"])];
    assert!(mesh.get_workflow(&steps).is_none());

    // One lookup per (step, input type) pair instead of one per partial chain.
    let lookups = recorder.count("directory", "discover_agents", true);
    assert!(lookups <= steps.len(), "{} directory lookups", lookups);
    Ok(())
}

#[tokio::test]
async fn test_undeploy_and_unregister() -> MeshResult<()> {
    let h = harness(7013);
    let info = h
        .mesh
        .deploy_and_register(UppercaseAgent, text_metadata(&["upper"]), &h.node.location)
        .await?;

    assert!(h.mesh.undeploy_and_unregister(info.agent_id).await?);
    assert!(h.directory.get_agent_info(info.agent_id).is_none());
    assert!(!h.node.protocol.agent_exists(&info.reference).await?);
    assert!(!h.mesh.undeploy_and_unregister(info.agent_id).await?);
    Ok(())
}

#[tokio::test]
async fn test_operations_are_recorded() -> MeshResult<()> {
    let node = LocalNode::new(7014);
    let recorder = RecordingRecorder::shared();
    let directory = Arc::new(
        InMemoryDirectory::new(DirectoryConfig::default(), EventFeed::with_capacity(16))
            .with_recorder(recorder.clone()),
    );
    let protocol = Arc::new(node.protocol.clone().with_recorder(recorder.clone()));
    let mesh = Mesh::new(directory, protocol);

    mesh.deploy_and_register(UppercaseAgent, text_metadata(&["upper"]), &node.location)
        .await?;

    assert_eq!(recorder.count("protocol", "send_agent", true), 1);
    assert_eq!(recorder.count("directory", "update_agent_status", true), 1);
    Ok(())
}
