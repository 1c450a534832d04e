//! Discovery scenarios, limits and event ordering.

use agentmesh_core::{Location, MeshResult};
use agentmesh_directory::{
    AgentDirectory, AgentMetadata, AgentQuery, AgentStatus, DirectoryConfig, DirectoryEvent,
    EventFeed, InMemoryDirectory, RemoteAgentRef,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

fn directory() -> InMemoryDirectory {
    InMemoryDirectory::new(DirectoryConfig::default(), EventFeed::with_capacity(1024))
}

fn reference() -> RemoteAgentRef {
    RemoteAgentRef::new(Uuid::now_v7(), Location::localhost(9000), "string", "string")
}

fn ids(found: &[agentmesh_directory::AgentInfo]) -> HashSet<Uuid> {
    found.iter().map(|i| i.agent_id).collect()
}

#[tokio::test]
async fn capability_subset_scenario() -> MeshResult<()> {
    let dir = directory();
    let a1 = reference();
    let a2 = reference();
    dir.register_agent(
        a1.clone(),
        AgentMetadata::new("string", "string")
            .with_capabilities(["nlp", "translation"])
            .with_property("language", "English"),
    )?;
    dir.register_agent(
        a2.clone(),
        AgentMetadata::new("string", "string").with_capabilities(["nlp", "sentiment"]),
    )?;

    let nlp = dir.discover_agents(&AgentQuery::for_capabilities(["nlp"]));
    assert_eq!(ids(&nlp), HashSet::from([a1.id, a2.id]));

    let translation = dir.discover_agents(&AgentQuery::for_capabilities(["translation"]));
    assert_eq!(ids(&translation), HashSet::from([a1.id]));

    let both = dir.discover_agents(&AgentQuery::for_capabilities(["nlp", "translation"]));
    assert_eq!(ids(&both), HashSet::from([a1.id]));
    Ok(())
}

#[tokio::test]
async fn only_active_scenario() -> MeshResult<()> {
    let dir = directory();
    let a1 = reference();
    dir.register_agent(a1.clone(), AgentMetadata::new("string", "string").with_capability("nlp"))?;
    dir.update_agent_status(a1.id, AgentStatus::Unavailable)?;

    let active = dir.discover_agents(&AgentQuery::new());
    assert!(!ids(&active).contains(&a1.id));

    let all = dir.discover_agents(&AgentQuery::new().include_inactive());
    assert!(ids(&all).contains(&a1.id));
    Ok(())
}

#[tokio::test]
async fn limit_is_enforced_and_newest_first() -> MeshResult<()> {
    let dir = directory();
    let mut registered = Vec::new();
    for _ in 0..25 {
        let r = reference();
        dir.register_agent(r.clone(), AgentMetadata::new("string", "string").with_capability("x"))?;
        registered.push(r.id);
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let found = dir.discover_agents(&AgentQuery::for_capabilities(["x"]).with_limit(5));
    assert_eq!(found.len(), 5);
    let expected: Vec<Uuid> = registered.iter().rev().take(5).copied().collect();
    let got: Vec<Uuid> = found.iter().map(|i| i.agent_id).collect();
    assert_eq!(got, expected);

    let default_limit = dir.discover_agents(&AgentQuery::for_capabilities(["x"]));
    assert_eq!(default_limit.len(), 10);

    let clamped = dir.discover_agents(&AgentQuery::for_capabilities(["x"]).with_limit(0));
    assert_eq!(clamped.len(), 1);
    Ok(())
}

#[tokio::test]
async fn discovery_on_empty_directory_is_empty() {
    let dir = directory();
    assert!(dir.discover_agents(&AgentQuery::for_capabilities(["nlp"])).is_empty());
    assert!(dir.get_agent_info(Uuid::now_v7()).is_none());
    assert!(dir.get_all_agents().is_empty());
}

#[tokio::test]
async fn registered_event_precedes_status_change() -> MeshResult<()> {
    let dir = directory();
    let mut first = dir.subscribe_to_events();
    let mut second = dir.subscribe_to_events();

    let a = reference();
    dir.register_agent(a.clone(), AgentMetadata::new("string", "string"))?;
    dir.update_agent_status(a.id, AgentStatus::Overloaded)?;

    for sub in [&mut first, &mut second] {
        let e1 = timeout(Duration::from_secs(5), sub.recv()).await.ok().flatten();
        let e2 = timeout(Duration::from_secs(5), sub.recv()).await.ok().flatten();
        assert!(matches!(e1, Some(DirectoryEvent::AgentRegistered { agent_id, .. }) if agent_id == a.id));
        assert!(matches!(
            e2,
            Some(DirectoryEvent::AgentStatusChanged {
                old_status: AgentStatus::Active,
                new_status: AgentStatus::Overloaded,
                ..
            })
        ));
    }
    Ok(())
}

#[tokio::test]
async fn update_events_carry_old_and_new_values() -> MeshResult<()> {
    let dir = directory();
    let a = reference();
    let old = AgentMetadata::new("string", "string").with_capability("nlp");
    dir.register_agent(a.clone(), old.clone())?;

    let mut sub = dir.subscribe_to_events();
    let new = AgentMetadata::new("string", "string").with_capability("summarization");
    dir.update_agent_metadata(a.id, new.clone())?;
    dir.update_agent_load_factor(a.id, Some(0.4))?;

    let e1 = timeout(Duration::from_secs(5), sub.recv()).await.ok().flatten();
    match e1 {
        Some(DirectoryEvent::AgentMetadataUpdated {
            old_metadata,
            new_metadata,
            ..
        }) => {
            assert_eq!(old_metadata, old);
            assert_eq!(new_metadata, new);
        }
        other => panic!("expected AgentMetadataUpdated, got {:?}", other),
    }

    let e2 = timeout(Duration::from_secs(5), sub.recv()).await.ok().flatten();
    match e2 {
        Some(DirectoryEvent::AgentLoadChanged { old_load, new_load, .. }) => {
            assert_eq!(old_load, None);
            assert_eq!(new_load, Some(0.4));
        }
        other => panic!("expected AgentLoadChanged, got {:?}", other),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_and_updates() -> MeshResult<()> {
    let dir = Arc::new(directory());
    let mut sub = dir.subscribe_to_events();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let dir = Arc::clone(&dir);
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for _ in 0..25 {
                let r = reference();
                dir.register_agent(r.clone(), AgentMetadata::new("string", "string"))?;
                dir.update_agent_status(r.id, AgentStatus::Overloaded)?;
                ids.push(r.id);
            }
            Ok::<_, agentmesh_core::MeshError>(ids)
        }));
    }

    let mut all_ids = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(ids) => all_ids.extend(ids?),
            Err(e) => panic!("task failed: {}", e),
        }
    }
    assert_eq!(dir.agent_count(), 200);
    assert_eq!(dir.active_count(), 0);

    // Per agent: registered strictly before status change.
    let mut registered = HashSet::new();
    for _ in 0..400 {
        let event = timeout(Duration::from_secs(5), sub.recv()).await.ok().flatten();
        match event {
            Some(DirectoryEvent::AgentRegistered { agent_id, .. }) => {
                registered.insert(agent_id);
            }
            Some(DirectoryEvent::AgentStatusChanged { agent_id, .. }) => {
                assert!(registered.contains(&agent_id));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(registered.len(), all_ids.len());
    Ok(())
}
