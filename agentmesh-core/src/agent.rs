//! Agent references, metadata and directory records.

use crate::error::ValidationError;
use crate::identity::{AgentId, Timestamp};
use crate::location::Location;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// REMOTE AGENT REFERENCE
// ============================================================================

/// Location-transparent handle to one deployed agent.
///
/// Created once at deploy time and never mutated. Safe to serialize and
/// hand to third parties: it carries no implementation detail beyond the
/// declared type tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAgentRef {
    pub id: AgentId,
    pub location: Location,
    pub input_type: String,
    pub output_type: String,
}

impl RemoteAgentRef {
    pub fn new(
        id: AgentId,
        location: Location,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            location,
            input_type: input_type.into(),
            output_type: output_type.into(),
        }
    }
}

impl fmt::Display for RemoteAgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} ({} -> {})",
            self.id, self.location, self.input_type, self.output_type
        )
    }
}

// ============================================================================
// AGENT METADATA
// ============================================================================

/// What an agent can do and what it accepts/produces.
///
/// Immutable once attached to an [`AgentInfo`]; updates replace it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetadata {
    /// Capability tags, matched by subset inclusion
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Type tag of accepted input
    pub input_type: String,
    /// Type tag of produced output
    pub output_type: String,
    /// Free-form key/value properties, matched exactly
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl AgentMetadata {
    /// Create metadata with the given input/output type tags and no capabilities.
    pub fn new(input_type: impl Into<String>, output_type: impl Into<String>) -> Self {
        Self {
            capabilities: BTreeSet::new(),
            input_type: input_type.into(),
            output_type: output_type.into(),
            properties: BTreeMap::new(),
            version: None,
        }
    }

    /// Add a capability tag.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Add several capability tags.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Add a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Reject blank type tags and blank capability strings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.input_type.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "inputType".to_string(),
            });
        }
        if self.output_type.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "outputType".to_string(),
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
}

// ============================================================================
// AGENT STATUS
// ============================================================================

/// Lifecycle status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStatus {
    /// Registered but not yet accepting work
    Initializing,
    /// Accepting work; the only status matched by `onlyActive` queries
    Active,
    /// Reachable but saturated
    Overloaded,
    /// Temporarily unreachable
    Unavailable,
    /// Draining before removal
    ShuttingDown,
    /// Conceptual terminal state; unregistering removes the record instead
    Deregistered,
}

impl AgentStatus {
    pub const ALL: [AgentStatus; 6] = [
        AgentStatus::Initializing,
        AgentStatus::Active,
        AgentStatus::Overloaded,
        AgentStatus::Unavailable,
        AgentStatus::ShuttingDown,
        AgentStatus::Deregistered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Initializing => "Initializing",
            AgentStatus::Active => "Active",
            AgentStatus::Overloaded => "Overloaded",
            AgentStatus::Unavailable => "Unavailable",
            AgentStatus::ShuttingDown => "ShuttingDown",
            AgentStatus::Deregistered => "Deregistered",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = ValidationError;

    /// Case-insensitive; accepts `ShuttingDown`, `shutting_down` and `shutting-down`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        AgentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "status".to_string(),
                reason: format!("unknown agent status '{}'", s),
            })
    }
}

// ============================================================================
// AGENT INFO
// ============================================================================

/// One directory record.
///
/// Never mutated field-by-field: every change produces a new value with
/// `last_updated` refreshed, so event payloads can carry old and new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub agent_id: AgentId,
    #[serde(rename = "ref")]
    pub reference: RemoteAgentRef,
    pub metadata: AgentMetadata,
    pub status: AgentStatus,
    pub registered_at: Timestamp,
    pub last_updated: Timestamp,
    /// Load in `[0, 1]` when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_factor: Option<f64>,
}

impl AgentInfo {
    /// Create a fresh record; `agent_id` is taken from the reference.
    pub fn new(reference: RemoteAgentRef, metadata: AgentMetadata, status: AgentStatus) -> Self {
        let now = Utc::now();
        Self {
            agent_id: reference.id,
            reference,
            metadata,
            status,
            registered_at: now,
            last_updated: now,
            load_factor: None,
        }
    }

    /// Copy with a new status.
    pub fn with_status(&self, status: AgentStatus) -> Self {
        Self {
            status,
            last_updated: Utc::now(),
            ..self.clone()
        }
    }

    /// Copy with replaced metadata.
    pub fn with_metadata(&self, metadata: AgentMetadata) -> Self {
        Self {
            metadata,
            last_updated: Utc::now(),
            ..self.clone()
        }
    }

    /// Copy with a new load factor, rejecting values outside `[0, 1]`.
    pub fn with_load_factor(&self, load_factor: Option<f64>) -> Result<Self, ValidationError> {
        if let Some(load) = load_factor {
            validate_load_factor(load)?;
        }
        Ok(Self {
            load_factor,
            last_updated: Utc::now(),
            ..self.clone()
        })
    }

    /// Copy with only `last_updated` refreshed.
    pub fn touched(&self) -> Self {
        Self {
            last_updated: Utc::now(),
            ..self.clone()
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

/// Check that a load factor is a finite value in `[0, 1]`.
pub fn validate_load_factor(load: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&load) {
        return Err(ValidationError::OutOfRange {
            field: "loadFactor".to_string(),
            value: load.to_string(),
            range: "[0, 1]".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::new_agent_id;

    fn sample_ref() -> RemoteAgentRef {
        RemoteAgentRef::new(new_agent_id(), Location::localhost(9000), "string", "string")
    }

    #[test]
    fn test_info_takes_id_from_reference() {
        let reference = sample_ref();
        let info = AgentInfo::new(reference.clone(), AgentMetadata::default(), AgentStatus::Active);
        assert_eq!(info.agent_id, reference.id);
        assert_eq!(info.registered_at, info.last_updated);
        assert!(info.load_factor.is_none());
    }

    #[test]
    fn test_with_status_produces_new_value() {
        let info = AgentInfo::new(sample_ref(), AgentMetadata::default(), AgentStatus::Active);
        let updated = info.with_status(AgentStatus::Unavailable);
        assert_eq!(info.status, AgentStatus::Active);
        assert_eq!(updated.status, AgentStatus::Unavailable);
        assert_eq!(updated.registered_at, info.registered_at);
        assert!(updated.last_updated >= info.last_updated);
    }

    #[test]
    fn test_load_factor_bounds() {
        let info = AgentInfo::new(sample_ref(), AgentMetadata::default(), AgentStatus::Active);
        assert!(info.with_load_factor(Some(0.0)).is_ok());
        assert!(info.with_load_factor(Some(1.0)).is_ok());
        assert!(info.with_load_factor(None).is_ok());
        assert!(info.with_load_factor(Some(1.01)).is_err());
        assert!(info.with_load_factor(Some(-0.1)).is_err());
        assert!(info.with_load_factor(Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_status_parse() -> Result<(), ValidationError> {
        assert_eq!("active".parse::<AgentStatus>()?, AgentStatus::Active);
        assert_eq!("ShuttingDown".parse::<AgentStatus>()?, AgentStatus::ShuttingDown);
        assert_eq!("shutting_down".parse::<AgentStatus>()?, AgentStatus::ShuttingDown);
        assert!("sleeping".parse::<AgentStatus>().is_err());
        Ok(())
    }

    #[test]
    fn test_metadata_validation() {
        let ok = AgentMetadata::new("string", "string").with_capability("nlp");
        assert!(ok.validate().is_ok());

        let blank_type = AgentMetadata::new(" ", "string");
        assert!(blank_type.validate().is_err());

        let blank_cap = AgentMetadata::new("string", "string").with_capability("");
        assert!(blank_cap.validate().is_err());
    }

    #[test]
    fn test_info_serializes_ref_field() -> Result<(), serde_json::Error> {
        let info = AgentInfo::new(sample_ref(), AgentMetadata::new("a", "b"), AgentStatus::Active);
        let json = serde_json::to_value(&info)?;
        assert!(json.get("ref").is_some());
        assert!(json.get("agentId").is_some());
        assert!(json.get("loadFactor").is_none());
        let back: AgentInfo = serde_json::from_value(json)?;
        assert_eq!(back, info);
        Ok(())
    }
}
