//! Multi-step workflows resolved from capability sequences.

use agentmesh_core::{AgentInfo, AgentQuery, RemoteAgentRef};
use agentmesh_directory::{matching, AgentDirectory};
use std::collections::{BTreeSet, HashSet};

/// A chain of agents where each step's output type equals the next step's
/// input type.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    steps: Vec<AgentInfo>,
}

impl Workflow {
    pub fn steps(&self) -> &[AgentInfo] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn references(&self) -> impl Iterator<Item = &RemoteAgentRef> {
        self.steps.iter().map(|s| &s.reference)
    }

    /// Input type of the first step.
    pub fn input_type(&self) -> Option<&str> {
        self.steps.first().map(|s| s.metadata.input_type.as_str())
    }

    /// Output type of the last step.
    pub fn output_type(&self) -> Option<&str> {
        self.steps.last().map(|s| s.metadata.output_type.as_str())
    }
}

/// Depth-first search over active candidates, least loaded first.
///
/// Type tags must match exactly between steps; no coercion is attempted.
/// Whether the remaining steps can be resolved depends only on the step
/// index and the incoming type, so failed pairs are remembered and never
/// searched twice.
pub(crate) fn resolve(
    directory: &dyn AgentDirectory,
    steps: &[BTreeSet<String>],
    candidate_limit: usize,
) -> Option<Workflow> {
    if steps.is_empty() {
        return None;
    }
    let mut chosen = Vec::with_capacity(steps.len());
    let mut dead_ends = HashSet::new();
    if extend(directory, steps, candidate_limit, None, &mut chosen, &mut dead_ends) {
        Some(Workflow { steps: chosen })
    } else {
        None
    }
}

fn extend(
    directory: &dyn AgentDirectory,
    remaining: &[BTreeSet<String>],
    candidate_limit: usize,
    input_type: Option<&str>,
    chosen: &mut Vec<AgentInfo>,
    dead_ends: &mut HashSet<(usize, Option<String>)>,
) -> bool {
    let Some((capabilities, rest)) = remaining.split_first() else {
        return true;
    };
    let state = (remaining.len(), input_type.map(str::to_string));
    if dead_ends.contains(&state) {
        return false;
    }

    let mut query = AgentQuery::for_capabilities(capabilities.iter().cloned())
        .with_limit(candidate_limit);
    if let Some(input_type) = input_type {
        query = query.with_input_type(input_type);
    }
    let mut candidates = directory.discover_agents(&query);
    candidates.sort_by(matching::load_order);

    for candidate in candidates {
        let output_type = candidate.metadata.output_type.clone();
        chosen.push(candidate);
        if extend(
            directory,
            rest,
            candidate_limit,
            Some(output_type.as_str()),
            chosen,
            dead_ends,
        ) {
            return true;
        }
        chosen.pop();
    }
    dead_ends.insert(state);
    false
}
