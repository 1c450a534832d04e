//! Configuration types

use crate::agent::AgentStatus;
use crate::error::{MeshError, MeshResult, ValidationError};
use crate::query::DEFAULT_QUERY_LIMIT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `register_agent` does when the id is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail with `AlreadyRegistered`
    #[default]
    Reject,
    /// Replace the record and publish `AgentRegistered` again
    Overwrite,
}

/// Directory settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Status assigned by `register_agent`
    pub initial_status: AgentStatus,
    pub duplicate_policy: DuplicatePolicy,
    pub default_query_limit: usize,
    pub max_query_limit: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            initial_status: AgentStatus::Active,
            duplicate_policy: DuplicatePolicy::Reject,
            default_query_limit: DEFAULT_QUERY_LIMIT,
            max_query_limit: 1000,
        }
    }
}

/// Event feed settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFeedConfig {
    /// Bounded queue length per subscriber
    pub subscriber_capacity: usize,
}

impl Default for EventFeedConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 256,
        }
    }
}

/// Protocol settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub call_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl ProtocolConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Node configuration, loadable from TOML.
///
/// Every section is optional in the file; missing sections and fields take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub directory: DirectoryConfig,
    pub events: EventFeedConfig,
    pub protocol: ProtocolConfig,
}

impl MeshConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> MeshResult<Self> {
        let config: MeshConfig =
            toml::from_str(source).map_err(|e| MeshError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that all configuration values are usable.
    pub fn validate(&self) -> MeshResult<()> {
        if self.directory.max_query_limit == 0 {
            return Err(ValidationError::OutOfRange {
                field: "directory.max_query_limit".to_string(),
                value: "0".to_string(),
                range: "[1, usize::MAX]".to_string(),
            }
            .into());
        }

        if self.directory.default_query_limit == 0
            || self.directory.default_query_limit > self.directory.max_query_limit
        {
            return Err(ValidationError::OutOfRange {
                field: "directory.default_query_limit".to_string(),
                value: self.directory.default_query_limit.to_string(),
                range: format!("[1, {}]", self.directory.max_query_limit),
            }
            .into());
        }

        if self.directory.initial_status == AgentStatus::Deregistered {
            return Err(ValidationError::InvalidValue {
                field: "directory.initial_status".to_string(),
                reason: "Deregistered cannot be an initial status".to_string(),
            }
            .into());
        }

        if self.events.subscriber_capacity == 0 {
            return Err(ValidationError::OutOfRange {
                field: "events.subscriber_capacity".to_string(),
                value: "0".to_string(),
                range: "[1, usize::MAX]".to_string(),
            }
            .into());
        }

        if self.protocol.call_timeout_ms == 0 {
            return Err(ValidationError::InvalidValue {
                field: "protocol.call_timeout_ms".to_string(),
                reason: "call timeout must be greater than 0".to_string(),
            }
            .into());
        }

        if self.protocol.connect_timeout_ms == 0 {
            return Err(ValidationError::InvalidValue {
                field: "protocol.connect_timeout_ms".to_string(),
                reason: "connect timeout must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
