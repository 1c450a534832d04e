//! Mapping between errors and reply envelopes.
//!
//! A host never fails a request at the transport level: it always answers
//! with an envelope. Failures travel as an `AGENT_RESPONSE` carrying
//! `errorKind` and `errorMessage` metadata, or as `AGENT_NOT_FOUND`.

use agentmesh_core::{
    metadata_keys, ErrorKind, Location, MeshError, MeshResult, MessageEnvelope, MessageType,
    ProtocolError, SerializationError, ValidationError,
};
use uuid::Uuid;

/// Reply to `request` describing `error`.
pub fn error_reply(request: &MessageEnvelope, error: &MeshError) -> MessageEnvelope {
    if let MeshError::Protocol(ProtocolError::NotFound { .. }) = error {
        return request.reply(MessageType::AgentNotFound, Vec::new());
    }
    request
        .reply(MessageType::AgentResponse, Vec::new())
        .with_metadata(metadata_keys::ERROR_KIND, error.kind().as_str())
        .with_metadata(metadata_keys::ERROR_MESSAGE, error.to_string())
}

/// Rebuild the error carried by an error reply.
fn error_from_metadata(reply: &MessageEnvelope, location: &Location) -> Option<MeshError> {
    let kind = ErrorKind::parse(reply.metadata_value(metadata_keys::ERROR_KIND)?)?;
    let message = reply
        .metadata_value(metadata_keys::ERROR_MESSAGE)
        .unwrap_or_default()
        .to_string();
    let agent_id = reply.agent_id().unwrap_or(Uuid::nil());

    let error = match kind {
        ErrorKind::NotFound => ProtocolError::NotFound { agent_id }.into(),
        ErrorKind::Transport => ProtocolError::Transport {
            location: location.to_string(),
            reason: message,
        }
        .into(),
        ErrorKind::Serialization => SerializationError::Decode {
            type_tag: "remote".to_string(),
            reason: message,
        }
        .into(),
        ErrorKind::Validation => ValidationError::InvalidValue {
            field: "envelope".to_string(),
            reason: message,
        }
        .into(),
        ErrorKind::Timeout | ErrorKind::Conflict | ErrorKind::Internal => ProtocolError::Remote {
            agent_id,
            reason: message,
        }
        .into(),
    };
    Some(error)
}

/// Check that `reply` answers `request` with `expected`, surfacing any
/// error it carries.
pub fn expect_reply(
    request: &MessageEnvelope,
    reply: MessageEnvelope,
    expected: MessageType,
    location: &Location,
) -> MeshResult<MessageEnvelope> {
    if reply.request_id() != Some(request.id) {
        return Err(ProtocolError::UnexpectedReply {
            request: request.message_type.to_string(),
            reply: format!("{} not correlated to request {}", reply.message_type, request.id),
        }
        .into());
    }

    if reply.message_type == MessageType::AgentNotFound && expected != MessageType::AgentNotFound {
        let agent_id = reply
            .agent_id()
            .or_else(|| request.agent_id())
            .unwrap_or(Uuid::nil());
        return Err(ProtocolError::NotFound { agent_id }.into());
    }

    if let Some(error) = error_from_metadata(&reply, location) {
        return Err(error);
    }

    if reply.message_type != expected {
        return Err(ProtocolError::UnexpectedReply {
            request: request.message_type.to_string(),
            reply: reply.message_type.to_string(),
        }
        .into());
    }

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::localhost(7000)
    }

    #[test]
    fn test_not_found_round_trip() {
        let id = Uuid::now_v7();
        let request = MessageEnvelope::new(MessageType::AgentCall, Vec::new()).with_agent_id(id);
        let reply = error_reply(&request, &ProtocolError::NotFound { agent_id: id }.into());
        assert_eq!(reply.message_type, MessageType::AgentNotFound);

        let err = expect_reply(&request, reply, MessageType::AgentResponse, &loc()).err();
        assert!(matches!(
            err,
            Some(MeshError::Protocol(ProtocolError::NotFound { agent_id })) if agent_id == id
        ));
    }

    #[test]
    fn test_error_kind_survives_reply() {
        let request = MessageEnvelope::new(MessageType::AgentCall, Vec::new());
        let error: MeshError = SerializationError::Decode {
            type_tag: "string".to_string(),
            reason: "bad".to_string(),
        }
        .into();
        let reply = error_reply(&request, &error);
        let err = expect_reply(&request, reply, MessageType::AgentResponse, &loc()).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Serialization));
    }

    #[test]
    fn test_uncorrelated_reply_rejected() {
        let request = MessageEnvelope::new(MessageType::AgentGet, Vec::new());
        let other = MessageEnvelope::new(MessageType::AgentGet, Vec::new());
        let reply = other.reply(MessageType::AgentFound, Vec::new());
        assert!(expect_reply(&request, reply, MessageType::AgentFound, &loc()).is_err());
    }

    #[test]
    fn test_wrong_reply_type_rejected() {
        let request = MessageEnvelope::new(MessageType::AgentGet, Vec::new());
        let reply = request.reply(MessageType::AgentResponse, Vec::new());
        let err = expect_reply(&request, reply, MessageType::AgentFound, &loc()).err();
        assert!(matches!(
            err,
            Some(MeshError::Protocol(ProtocolError::UnexpectedReply { .. }))
        ));
    }
}
