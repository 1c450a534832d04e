//! Discovery queries.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Default number of results returned by a discovery query.
pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// A conjunctive filter over directory records.
///
/// Every populated field narrows the result; an empty query matches every
/// active agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentQuery {
    /// Must be a subset of the agent's capabilities
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
    /// Every pair must be present and equal in the agent's properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_only_active")]
    pub only_active: bool,
}

fn default_limit() -> usize {
    DEFAULT_QUERY_LIMIT
}

fn default_only_active() -> bool {
    true
}

impl Default for AgentQuery {
    fn default() -> Self {
        Self {
            capabilities: BTreeSet::new(),
            input_type: None,
            output_type: None,
            properties: BTreeMap::new(),
            limit: DEFAULT_QUERY_LIMIT,
            only_active: true,
        }
    }
}

impl AgentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query requiring all of the given capabilities.
    pub fn for_capabilities<I, S>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().with_capabilities(capabilities)
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_input_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = Some(input_type.into());
        self
    }

    pub fn with_output_type(mut self, output_type: impl Into<String>) -> Self {
        self.output_type = Some(output_type.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Also match agents that are not `Active`.
    pub fn include_inactive(mut self) -> Self {
        self.only_active = false;
        self
    }

    /// Reject a zero limit or one above `max_limit`.
    pub fn validate(&self, max_limit: usize) -> Result<(), ValidationError> {
        if self.limit == 0 || self.limit > max_limit {
            return Err(ValidationError::OutOfRange {
                field: "limit".to_string(),
                value: self.limit.to_string(),
                range: format!("[1, {}]", max_limit),
            });
        }
        if self.capabilities.iter().any(|c| c.trim().is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: "capabilities".to_string(),
                reason: "capability tags must not be blank".to_string(),
            });
        }
        Ok(())
    }

    /// Effective limit clamped to `[1, max_limit]`.
    pub fn effective_limit(&self, max_limit: usize) -> usize {
        self.limit.clamp(1, max_limit.max(1))
    }
}
