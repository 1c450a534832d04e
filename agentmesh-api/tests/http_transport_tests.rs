//! `HttpProtocol` against real nodes served on loopback.

use std::sync::Arc;
use std::time::Duration;

use agentmesh_api::{create_router, ApiConfig, AppState};
use agentmesh_core::{
    AgentQuery, ErrorKind, Location, MeshConfig, MeshError, MessageEnvelope, MessageType,
    NoopRecorder, ProtocolConfig, ProtocolError, RemoteAgentRef,
};
use agentmesh_directory::{AgentDirectory, InMemoryDirectory};
use agentmesh_mesh::Mesh;
use agentmesh_protocol::{reference_from_reply, HttpProtocol, MeshProtocol, MeshProtocolExt};
use agentmesh_test_utils::assertions::assert_kind;
use agentmesh_test_utils::fixtures::{
    fixture_catalog, text_metadata, FailingAgent, SlowAgent, UppercaseAgent, WordCountAgent,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Serve a fresh node on an ephemeral loopback port.
async fn spawn_node() -> Result<(Location, AppState), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let location = Location::localhost(listener.local_addr()?.port());
    let state = AppState::build(
        MeshConfig::default(),
        location.clone(),
        fixture_catalog(),
        NoopRecorder::shared(),
    );
    let app = create_router(state.clone(), &ApiConfig::default());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((location, state))
}

/// Serve a gateway that answers every request with 504.
async fn spawn_timing_out_gateway() -> Result<Location, Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let location = Location::localhost(listener.local_addr()?.port());
    let app = axum::Router::new().fallback(|| async {
        (
            axum::http::StatusCode::GATEWAY_TIMEOUT,
            axum::Json(serde_json::json!({
                "code": "TIMEOUT",
                "message": "upstream timed out",
            })),
        )
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(location)
}

fn protocol() -> Result<HttpProtocol, agentmesh_core::MeshError> {
    HttpProtocol::new(&ProtocolConfig::default())
}

#[tokio::test]
async fn test_deploy_call_undeploy_over_http() -> TestResult {
    let (location, state) = spawn_node().await?;
    let protocol = protocol()?;

    let reference = protocol.deploy(UppercaseAgent, &location).await?;
    assert_eq!(reference.location, location);
    assert!(state.host.contains(reference.id));

    let output: String = protocol
        .call_remote_agent(&reference, &"hello".to_string())
        .await?;
    assert_eq!(output, "HELLO");

    assert!(protocol.agent_exists(&reference).await?);
    assert!(protocol.undeploy_agent(&reference).await?);
    assert!(!protocol.agent_exists(&reference).await?);
    assert!(!protocol.undeploy_agent(&reference).await?);

    let result: agentmesh_core::MeshResult<String> = protocol
        .call_remote_agent(&reference, &"hello".to_string())
        .await;
    assert_kind(&result, ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn test_typed_output_over_http() -> TestResult {
    let (location, _state) = spawn_node().await?;
    let protocol = protocol()?;

    let reference = protocol.deploy(WordCountAgent, &location).await?;
    assert_eq!(reference.output_type, "u64");
    let count: u64 = protocol
        .call_remote_agent(&reference, &"one two three".to_string())
        .await?;
    assert_eq!(count, 3);
    Ok(())
}

#[tokio::test]
async fn test_agent_failure_maps_to_internal() -> TestResult {
    let (location, _state) = spawn_node().await?;
    let protocol = protocol()?;

    let reference = protocol
        .deploy(FailingAgent::new("model unavailable"), &location)
        .await?;
    let result: agentmesh_core::MeshResult<String> = protocol
        .call_remote_agent(&reference, &"hello".to_string())
        .await;
    assert_kind(&result, ErrorKind::Internal);
    if let Err(e) = result {
        assert!(e.to_string().contains("model unavailable"));
    }
    Ok(())
}

#[tokio::test]
async fn test_server_side_type_mismatch() -> TestResult {
    let (location, _state) = spawn_node().await?;
    let protocol = protocol()?;

    let mut reference = protocol.deploy(UppercaseAgent, &location).await?;
    // A stale or forged reference declaring the wrong input type.
    reference.input_type = "i64".to_string();
    let result = protocol
        .call_remote_bytes(&reference, b"42".to_vec(), Duration::from_secs(5))
        .await;
    assert_kind(&result, ErrorKind::Serialization);
    Ok(())
}

#[tokio::test]
async fn test_call_timeout() -> TestResult {
    let (location, _state) = spawn_node().await?;
    let protocol = protocol()?;

    let reference = protocol
        .deploy(SlowAgent::new(Duration::from_millis(500)), &location)
        .await?;
    let result: agentmesh_core::MeshResult<String> = protocol
        .call_remote_agent_with_timeout(&reference, &"zzz".to_string(), Duration::from_millis(50))
        .await;
    assert_kind(&result, ErrorKind::Timeout);
    Ok(())
}

#[tokio::test]
async fn test_gateway_timeout_reports_caller_deadline() -> TestResult {
    let location = spawn_timing_out_gateway().await?;
    let protocol = HttpProtocol::new(&ProtocolConfig {
        call_timeout_ms: 1_500,
        ..ProtocolConfig::default()
    })?;
    let reference = RemoteAgentRef::new(uuid::Uuid::now_v7(), location, "string", "string");

    let call = protocol
        .call_remote_bytes(&reference, b"\"x\"".to_vec(), Duration::from_millis(750))
        .await;
    match call {
        Err(MeshError::Protocol(ProtocolError::Timeout { timeout, .. })) => {
            assert_eq!(timeout, Duration::from_millis(750));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }

    // Calls without an explicit deadline report the configured one.
    match protocol.agent_exists(&reference).await {
        Err(MeshError::Protocol(ProtocolError::Timeout { timeout, .. })) => {
            assert_eq!(timeout, Duration::from_millis(1_500));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_unreachable_node() -> TestResult {
    let protocol = protocol()?;
    // Nothing listens on the discard port.
    let result = protocol.deploy(UppercaseAgent, &Location::localhost(9)).await;
    assert_kind(&result, ErrorKind::Transport);
    Ok(())
}

#[tokio::test]
async fn test_send_and_receive_get() -> TestResult {
    let (location, _state) = spawn_node().await?;
    let protocol = protocol()?;
    let reference = protocol.deploy(UppercaseAgent, &location).await?;

    let request = MessageEnvelope::new(MessageType::AgentGet, Vec::new()).with_agent_id(reference.id);
    let reply = protocol.send_and_receive(&location, request.clone()).await?;
    assert_eq!(reply.message_type, MessageType::AgentFound);
    assert!(reply.answers(&request));
    assert_eq!(reference_from_reply(&reply)?, reference);

    let missing = MessageEnvelope::new(MessageType::AgentGet, Vec::new())
        .with_agent_id(uuid::Uuid::now_v7());
    let reply = protocol.send_and_receive(&location, missing).await?;
    assert_eq!(reply.message_type, MessageType::AgentNotFound);
    Ok(())
}

#[tokio::test]
async fn test_mesh_across_two_nodes() -> TestResult {
    let (node_a, _state_a) = spawn_node().await?;
    let (node_b, state_b) = spawn_node().await?;

    let directory: Arc<dyn AgentDirectory> = Arc::new(InMemoryDirectory::with_defaults());
    let mesh = Mesh::new(Arc::clone(&directory), Arc::new(protocol()?));

    let first = mesh
        .deploy_and_register(UppercaseAgent, text_metadata(&["nlp", "shout"]), &node_a)
        .await?;
    let second = mesh
        .deploy_and_register(UppercaseAgent, text_metadata(&["nlp", "shout"]), &node_b)
        .await?;
    assert_eq!(directory.active_count(), 2);

    // Prefer the second node, then take it away behind the directory's back.
    directory.update_agent_load_factor(first.agent_id, Some(0.9))?;
    directory.update_agent_load_factor(second.agent_id, Some(0.1))?;
    assert!(state_b.host.undeploy(second.agent_id));

    let output: String = mesh
        .call_with_failover(&AgentQuery::for_capabilities(["shout"]), &"failover".to_string())
        .await?;
    assert_eq!(output, "FAILOVER");
    Ok(())
}
