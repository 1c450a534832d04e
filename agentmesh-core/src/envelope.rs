//! Wire-level message envelope.
//!
//! All protocol traffic is expressed as envelopes. The payload is opaque
//! bytes produced by the payload codec; out-of-band fields travel in the
//! string metadata map under the keys in [`metadata_keys`].

use crate::error::ValidationError;
use crate::identity::{new_message_id, AgentId, MessageId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Well-known metadata keys.
pub mod metadata_keys {
    /// Target or subject agent id
    pub const AGENT_ID: &str = "agentId";
    pub const INPUT_TYPE: &str = "inputType";
    pub const OUTPUT_TYPE: &str = "outputType";
    /// Id of the envelope a response answers
    pub const REQUEST_ID: &str = "requestId";
    /// Set on a response whose agent failed
    pub const ERROR_KIND: &str = "errorKind";
    pub const ERROR_MESSAGE: &str = "errorMessage";
    pub const STATUS: &str = "status";

    pub const ALL: [&str; 7] = [
        AGENT_ID,
        INPUT_TYPE,
        OUTPUT_TYPE,
        REQUEST_ID,
        ERROR_KIND,
        ERROR_MESSAGE,
        STATUS,
    ];

    /// Canonical spelling of a well-known key, matched case-insensitively.
    pub fn canonical(key: &str) -> Option<&'static str> {
        ALL.into_iter().find(|k| k.eq_ignore_ascii_case(key))
    }
}

/// Envelope message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    AgentDeploy,
    AgentCall,
    AgentResponse,
    AgentGet,
    AgentFound,
    AgentNotFound,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::AgentDeploy,
        MessageType::AgentCall,
        MessageType::AgentResponse,
        MessageType::AgentGet,
        MessageType::AgentFound,
        MessageType::AgentNotFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::AgentDeploy => "AGENT_DEPLOY",
            MessageType::AgentCall => "AGENT_CALL",
            MessageType::AgentResponse => "AGENT_RESPONSE",
            MessageType::AgentGet => "AGENT_GET",
            MessageType::AgentFound => "AGENT_FOUND",
            MessageType::AgentNotFound => "AGENT_NOT_FOUND",
        }
    }

    /// Single-byte discriminant used by the binary frame codec.
    pub fn to_u8(self) -> u8 {
        match self {
            MessageType::AgentDeploy => 1,
            MessageType::AgentCall => 2,
            MessageType::AgentResponse => 3,
            MessageType::AgentGet => 4,
            MessageType::AgentFound => 5,
            MessageType::AgentNotFound => 6,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        MessageType::ALL.into_iter().find(|t| t.to_u8() == value)
    }

    /// True for the types a host sends back in answer to a request.
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            MessageType::AgentResponse | MessageType::AgentFound | MessageType::AgentNotFound
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "messageType".to_string(),
                reason: format!("unknown message type '{}'", s),
            })
    }
}

/// The wire unit exchanged by the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub id: MessageId,
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl MessageEnvelope {
    /// New envelope with a fresh id and empty metadata.
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            id: new_message_id(),
            message_type,
            payload,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_agent_id(self, agent_id: AgentId) -> Self {
        self.with_metadata(metadata_keys::AGENT_ID, agent_id.to_string())
    }

    /// Build a reply correlated to this envelope through `requestId`.
    pub fn reply(&self, message_type: MessageType, payload: Vec<u8>) -> Self {
        let mut reply = Self::new(message_type, payload)
            .with_metadata(metadata_keys::REQUEST_ID, self.id.to_string());
        if let Some(agent_id) = self.metadata.get(metadata_keys::AGENT_ID) {
            reply
                .metadata
                .insert(metadata_keys::AGENT_ID.to_string(), agent_id.clone());
        }
        reply
    }

    /// Look up a metadata entry, exact spelling first and then ignoring
    /// ASCII case. Keys carried in HTTP headers lose their case in transit.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .or_else(|| {
                self.metadata
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// The `agentId` metadata entry, if present and well-formed.
    pub fn agent_id(&self) -> Option<AgentId> {
        self.metadata_value(metadata_keys::AGENT_ID)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// The `requestId` metadata entry, if present and well-formed.
    pub fn request_id(&self) -> Option<MessageId> {
        self.metadata_value(metadata_keys::REQUEST_ID)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// True if this envelope answers `request`.
    pub fn answers(&self, request: &MessageEnvelope) -> bool {
        self.message_type.is_reply() && self.request_id() == Some(request.id)
    }

    pub fn is_error(&self) -> bool {
        self.metadata.contains_key(metadata_keys::ERROR_KIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::new_agent_id;

    #[test]
    fn test_message_type_codes_are_unique() {
        for t in MessageType::ALL {
            assert_eq!(MessageType::from_u8(t.to_u8()), Some(t));
        }
        assert_eq!(MessageType::from_u8(0), None);
        assert_eq!(MessageType::from_u8(200), None);
    }

    #[test]
    fn test_message_type_parse() -> Result<(), ValidationError> {
        assert_eq!("AGENT_CALL".parse::<MessageType>()?, MessageType::AgentCall);
        assert_eq!("agent_found".parse::<MessageType>()?, MessageType::AgentFound);
        assert!("AGENT_DANCE".parse::<MessageType>().is_err());
        Ok(())
    }

    #[test]
    fn test_reply_correlates_request() {
        let agent_id = new_agent_id();
        let request = MessageEnvelope::new(MessageType::AgentCall, b"hi".to_vec())
            .with_agent_id(agent_id);
        let reply = request.reply(MessageType::AgentResponse, b"HI".to_vec());

        assert_ne!(reply.id, request.id);
        assert_eq!(reply.request_id(), Some(request.id));
        assert_eq!(reply.agent_id(), Some(agent_id));
        assert!(reply.answers(&request));
        assert!(!request.answers(&reply));
    }

    #[test]
    fn test_canonical_metadata_keys() {
        assert_eq!(metadata_keys::canonical("agentid"), Some("agentId"));
        assert_eq!(metadata_keys::canonical("REQUESTID"), Some("requestId"));
        assert_eq!(metadata_keys::canonical("custom"), None);
    }

    #[test]
    fn test_metadata_lookup_ignores_case() {
        let envelope = MessageEnvelope::new(MessageType::AgentCall, Vec::new())
            .with_metadata("traceid", "abc")
            .with_metadata("Tenant", "x")
            .with_metadata("tenant", "y");
        assert_eq!(envelope.metadata_value("traceId"), Some("abc"));
        // An exact match wins over a case-insensitive one.
        assert_eq!(envelope.metadata_value("Tenant"), Some("x"));
        assert_eq!(envelope.metadata_value("tenant"), Some("y"));
        assert_eq!(envelope.metadata_value("missing"), None);
    }

    #[test]
    fn test_malformed_agent_id_is_absent() {
        let env = MessageEnvelope::new(MessageType::AgentGet, Vec::new())
            .with_metadata(metadata_keys::AGENT_ID, "not-a-uuid");
        assert_eq!(env.agent_id(), None);
    }

    #[test]
    fn test_serde_uses_wire_names() -> Result<(), serde_json::Error> {
        let env = MessageEnvelope::new(MessageType::AgentNotFound, Vec::new());
        let json = serde_json::to_value(&env)?;
        assert_eq!(json["messageType"], "AGENT_NOT_FOUND");
        Ok(())
    }
}
