//! Directory event stream over a real WebSocket.

use std::time::Duration;

use agentmesh_api::ws::parse_frame;
use agentmesh_api::{create_router, ApiConfig, AppState, StreamFrame, StreamNotice};
use agentmesh_core::{AgentStatus, DirectoryEvent, Location, MeshConfig, NoopRecorder};
use agentmesh_test_utils::fixtures::{fixture_catalog, text_metadata, unhosted_reference};
use futures_util::{Stream, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite};

type TestResult = Result<(), Box<dyn std::error::Error>>;

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

async fn next_frame<S>(stream: &mut S) -> Result<StreamFrame, Box<dyn std::error::Error>>
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await?
            .ok_or("stream ended")??;
        if message.is_text() {
            return Ok(parse_frame(message.to_text()?)?);
        }
    }
}

#[tokio::test]
async fn test_event_stream_delivers_directory_changes() -> TestResult {
    let (location, state) = spawn_node().await?;
    let url = format!("ws://{}/directory/events", location.authority());
    let (mut stream, _) = connect_async(url).await?;

    let frame = next_frame(&mut stream).await?;
    assert!(matches!(
        frame,
        StreamFrame::Notice(StreamNotice::Connected { .. })
    ));

    let metadata = text_metadata(&["nlp"]);
    let info = state
        .directory
        .register_agent(unhosted_reference(&metadata), metadata)?;
    state
        .directory
        .update_agent_status(info.agent_id, AgentStatus::Overloaded)?;
    state.directory.unregister_agent(info.agent_id);

    match next_frame(&mut stream).await? {
        StreamFrame::Event(DirectoryEvent::AgentRegistered { agent_id, .. }) => {
            assert_eq!(agent_id, info.agent_id)
        }
        other => panic!("expected AgentRegistered, got {:?}", other),
    }
    match next_frame(&mut stream).await? {
        StreamFrame::Event(DirectoryEvent::AgentStatusChanged {
            old_status,
            new_status,
            ..
        }) => {
            assert_eq!(old_status, info.status);
            assert_eq!(new_status, AgentStatus::Overloaded);
        }
        other => panic!("expected AgentStatusChanged, got {:?}", other),
    }
    match next_frame(&mut stream).await? {
        StreamFrame::Event(DirectoryEvent::AgentUnregistered { agent_id, .. }) => {
            assert_eq!(agent_id, info.agent_id)
        }
        other => panic!("expected AgentUnregistered, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_each_connection_is_its_own_subscriber() -> TestResult {
    let (location, state) = spawn_node().await?;
    let url = format!("ws://{}/directory/events", location.authority());
    let (mut first, _) = connect_async(url.as_str()).await?;
    let (mut second, _) = connect_async(url.as_str()).await?;

    let id_of = |frame: StreamFrame| match frame {
        StreamFrame::Notice(StreamNotice::Connected { subscriber_id }) => Some(subscriber_id),
        _ => None,
    };
    let first_id = id_of(next_frame(&mut first).await?);
    let second_id = id_of(next_frame(&mut second).await?);
    assert!(first_id.is_some() && second_id.is_some());
    assert_ne!(first_id, second_id);

    let metadata = text_metadata(&["vision"]);
    let info = state
        .directory
        .register_agent(unhosted_reference(&metadata), metadata)?;

    for stream in [&mut first, &mut second] {
        match next_frame(stream).await? {
            StreamFrame::Event(event) => assert_eq!(event.agent_id(), info.agent_id),
            other => panic!("expected an event, got {:?}", other),
        }
    }
    Ok(())
}
