//! Query matching.
//!
//! A record matches a query iff all five conditions hold. There is no
//! ranking; callers that want a "best" match sort the result themselves.

use agentmesh_core::{AgentInfo, AgentQuery, AgentStatus};
use std::cmp::Ordering;

/// True iff `info` satisfies every condition of `query`.
pub fn matches(query: &AgentQuery, info: &AgentInfo) -> bool {
    capabilities_match(query, info)
        && input_type_matches(query, info)
        && output_type_matches(query, info)
        && properties_match(query, info)
        && status_matches(query, info)
}

/// Query capabilities are a subset of the record's capabilities.
pub fn capabilities_match(query: &AgentQuery, info: &AgentInfo) -> bool {
    query.capabilities.is_subset(&info.metadata.capabilities)
}

pub fn input_type_matches(query: &AgentQuery, info: &AgentInfo) -> bool {
    query
        .input_type
        .as_ref()
        .map_or(true, |t| *t == info.metadata.input_type)
}

pub fn output_type_matches(query: &AgentQuery, info: &AgentInfo) -> bool {
    query
        .output_type
        .as_ref()
        .map_or(true, |t| *t == info.metadata.output_type)
}

/// Every queried property is present with an equal value.
pub fn properties_match(query: &AgentQuery, info: &AgentInfo) -> bool {
    query
        .properties
        .iter()
        .all(|(k, v)| info.metadata.properties.get(k) == Some(v))
}

pub fn status_matches(query: &AgentQuery, info: &AgentInfo) -> bool {
    !query.only_active || info.status == AgentStatus::Active
}

/// Discovery order: newest registration first, ties broken by id descending.
pub fn discovery_order(a: &AgentInfo, b: &AgentInfo) -> Ordering {
    b.registered_at
        .cmp(&a.registered_at)
        .then_with(|| b.agent_id.cmp(&a.agent_id))
}

/// Ascending load order; agents that never reported load sort last.
pub fn load_order(a: &AgentInfo, b: &AgentInfo) -> Ordering {
    match (a.load_factor, b.load_factor) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
