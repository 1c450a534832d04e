//! HTTP transport client.
//!
//! | Operation          | Request                          | Success            |
//! |--------------------|----------------------------------|--------------------|
//! | `send_agent`       | `POST /agents` (descriptor JSON) | `{"agentId": ..}`  |
//! | `call_remote_*`    | `POST /agents/{id}/call`         | encoded output     |
//! | `agent_exists`     | `GET /agents/{id}`               | 200, or 404        |
//! | `undeploy_agent`   | `DELETE /agents/{id}`            | 204, or 404        |
//! | `send_and_receive` | `POST /messages`                 | reply envelope     |
//!
//! Raw envelopes travel as the request body plus `X-Message-Type`,
//! `X-Message-Id` and one `X-Metadata-<key>` header per metadata entry.

use crate::agent::ErasedAgent;
use crate::protocol::{AgentHandle, MeshProtocol};
use agentmesh_core::{
    metadata_keys, AgentId, Location, MeshError, MeshResult, MessageEnvelope, MessageType,
    NoopRecorder, OperationTimer, ProtocolConfig, ProtocolError, RemoteAgentRef,
    SerializationError, SharedRecorder, ValidationError,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const COMPONENT: &str = "protocol";

/// Header names used by the HTTP binding.
pub mod headers {
    pub const MESSAGE_TYPE: &str = "x-message-type";
    pub const MESSAGE_ID: &str = "x-message-id";
    pub const METADATA_PREFIX: &str = "x-metadata-";
    /// Declared input type tag on `POST /agents/{id}/call`
    pub const INPUT_TYPE: &str = "x-input-type";
}

/// Body of a successful `POST /agents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub agent_id: AgentId,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

// ============================================================================
// ENVELOPE <-> HTTP
// ============================================================================

fn header_value(value: &str) -> Result<HeaderValue, SerializationError> {
    // Header values cannot carry control characters.
    let cleaned: String = value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    HeaderValue::from_bytes(cleaned.as_bytes()).map_err(|e| SerializationError::Encode {
        type_tag: "envelope".to_string(),
        reason: e.to_string(),
    })
}

/// Headers describing `envelope`.
pub fn envelope_headers(envelope: &MessageEnvelope) -> Result<HeaderMap, SerializationError> {
    let mut map = HeaderMap::new();
    map.insert(headers::MESSAGE_TYPE, header_value(envelope.message_type.as_str())?);
    map.insert(headers::MESSAGE_ID, header_value(&envelope.id.to_string())?);
    for (key, value) in &envelope.metadata {
        let name = HeaderName::from_bytes(
            format!("{}{}", headers::METADATA_PREFIX, key.to_ascii_lowercase()).as_bytes(),
        )
        .map_err(|e| SerializationError::Encode {
            type_tag: "envelope".to_string(),
            reason: format!("metadata key '{}': {}", key, e),
        })?;
        map.insert(name, header_value(value)?);
    }
    Ok(map)
}

/// Rebuild an envelope from headers and body.
///
/// Header names are case-insensitive, so well-known metadata keys get their
/// canonical spelling back and other keys arrive lowercased.
/// [`MessageEnvelope::metadata_value`] still finds those under their original
/// spelling. A missing `X-Message-Id` gets a fresh id.
pub fn envelope_from_http(headers: &HeaderMap, body: Vec<u8>) -> MeshResult<MessageEnvelope> {
    let message_type: MessageType = headers
        .get(headers::MESSAGE_TYPE)
        .ok_or_else(|| ValidationError::RequiredFieldMissing {
            field: "X-Message-Type".to_string(),
        })?
        .to_str()
        .map_err(|_| ValidationError::InvalidValue {
            field: "X-Message-Type".to_string(),
            reason: "not ASCII".to_string(),
        })?
        .parse()?;

    let mut envelope = MessageEnvelope::new(message_type, body);
    if let Some(id) = headers.get(headers::MESSAGE_ID) {
        envelope.id = id
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "X-Message-Id".to_string(),
                reason: "not a UUID".to_string(),
            })?;
    }

    for (name, value) in headers {
        let Some(key) = name.as_str().strip_prefix(headers::METADATA_PREFIX) else {
            continue;
        };
        let value = String::from_utf8(value.as_bytes().to_vec()).map_err(|_| {
            ValidationError::InvalidValue {
                field: name.to_string(),
                reason: "not UTF-8".to_string(),
            }
        })?;
        let key = metadata_keys::canonical(key)
            .map(str::to_string)
            .unwrap_or_else(|| key.to_string());
        envelope.metadata.insert(key, value);
    }
    Ok(envelope)
}

// ============================================================================
// CLIENT
// ============================================================================

/// [`MeshProtocol`] over HTTP.
///
/// Cannot materialize local handles: `get_remote_agent` always returns
/// `None`.
#[derive(Clone)]
pub struct HttpProtocol {
    client: reqwest::Client,
    call_timeout: Duration,
    recorder: SharedRecorder,
}

impl std::fmt::Debug for HttpProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProtocol")
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl HttpProtocol {
    pub fn new(config: &ProtocolConfig) -> MeshResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| MeshError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            call_timeout: config.call_timeout(),
            recorder: NoopRecorder::shared(),
        })
    }

    pub fn with_recorder(mut self, recorder: SharedRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    fn url(location: &Location, path: &str) -> String {
        format!("{}{}", location.base_url(), path)
    }

    /// Run `request` under `timeout`, mapping connection failures.
    async fn timed<F>(
        &self,
        operation: &str,
        location: &Location,
        timeout: Duration,
        request: F,
    ) -> MeshResult<reqwest::Response>
    where
        F: Future<Output = Result<reqwest::Response, reqwest::Error>> + Send,
    {
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(transport_error(location, e)),
            Err(_) => Err(ProtocolError::Timeout {
                operation: format!("{} to {}", operation, location),
                timeout,
            }
            .into()),
        }
    }

    async fn send_agent_inner(
        &self,
        agent: Arc<dyn ErasedAgent>,
        destination: &Location,
    ) -> MeshResult<RemoteAgentRef> {
        let descriptor = agent.descriptor();
        let request = self
            .client
            .post(Self::url(destination, "/agents"))
            .header(CONTENT_TYPE, "application/json")
            .body(descriptor.to_bytes()?)
            .send();
        let response = self
            .timed("send_agent", destination, self.call_timeout, request)
            .await?;
        let response =
            check_status("send_agent", destination, self.call_timeout, None, response).await?;
        let body = read_body(destination, response).await?;
        let deployed: DeployResponse =
            serde_json::from_slice(&body).map_err(|e| SerializationError::Decode {
                type_tag: "DeployResponse".to_string(),
                reason: e.to_string(),
            })?;
        Ok(RemoteAgentRef::new(
            deployed.agent_id,
            destination.clone(),
            descriptor.input_type,
            descriptor.output_type,
        ))
    }

    async fn call_inner(
        &self,
        reference: &RemoteAgentRef,
        input: Vec<u8>,
        timeout: Duration,
    ) -> MeshResult<Vec<u8>> {
        let location = &reference.location;
        let request = self
            .client
            .post(Self::url(location, &format!("/agents/{}/call", reference.id)))
            .header(CONTENT_TYPE, "application/json")
            .header(headers::INPUT_TYPE, reference.input_type.as_str())
            .body(input)
            .send();
        let response = self
            .timed("call_remote_agent", location, timeout, request)
            .await?;
        let response =
            check_status("call_remote_agent", location, timeout, Some(reference.id), response)
                .await?;
        read_body(location, response).await
    }

    /// Issue a request whose only interesting outcomes are success or 404.
    async fn probe(
        &self,
        operation: &str,
        reference: &RemoteAgentRef,
        request: reqwest::RequestBuilder,
    ) -> MeshResult<bool> {
        let location = &reference.location;
        let response = self
            .timed(operation, location, self.call_timeout, request.send())
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(operation, location, self.call_timeout, Some(reference.id), response).await?;
        Ok(true)
    }

    async fn exchange(
        &self,
        location: &Location,
        envelope: &MessageEnvelope,
    ) -> MeshResult<MessageEnvelope> {
        let request = self
            .client
            .post(Self::url(location, "/messages"))
            .headers(envelope_headers(envelope)?)
            .body(envelope.payload.clone())
            .send();
        let response = self
            .timed("send_and_receive", location, self.call_timeout, request)
            .await?;
        let response = check_status(
            "send_and_receive",
            location,
            self.call_timeout,
            envelope.agent_id(),
            response,
        )
        .await?;
        let headers = response.headers().clone();
        let body = read_body(location, response).await?;
        envelope_from_http(&headers, body)
    }
}

fn transport_error(location: &Location, error: reqwest::Error) -> MeshError {
    ProtocolError::Transport {
        location: location.to_string(),
        reason: error.to_string(),
    }
    .into()
}

async fn read_body(location: &Location, response: reqwest::Response) -> MeshResult<Vec<u8>> {
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| transport_error(location, e))
}

/// Map a non-success status onto the error taxonomy.
///
/// A 504 reports the deadline the caller gave `operation`.
async fn check_status(
    operation: &str,
    location: &Location,
    timeout: Duration,
    agent_id: Option<AgentId>,
    response: reqwest::Response,
) -> MeshResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.unwrap_or_default();
    let (code, message) = match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(parsed) => (parsed.code, parsed.message),
        Err(_) => (String::new(), String::from_utf8_lossy(&body).into_owned()),
    };
    debug!(location = %location, status = %status, code = %code, "Remote returned error status");

    let agent_id = agent_id.unwrap_or(Uuid::nil());
    let error = match status {
        StatusCode::NOT_FOUND => ProtocolError::NotFound { agent_id }.into(),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ValidationError::InvalidValue {
                field: "request".to_string(),
                reason: message,
            }
            .into()
        }
        StatusCode::BAD_GATEWAY => ProtocolError::Transport {
            location: location.to_string(),
            reason: message,
        }
        .into(),
        StatusCode::GATEWAY_TIMEOUT => ProtocolError::Timeout {
            operation: format!("{} to {}", operation, location),
            timeout,
        }
        .into(),
        _ if code == "SERIALIZATION_ERROR" => SerializationError::Decode {
            type_tag: "remote".to_string(),
            reason: message,
        }
        .into(),
        _ => ProtocolError::Remote {
            agent_id,
            reason: format!("HTTP {}: {}", status, message),
        }
        .into(),
    };
    Err(error)
}

#[async_trait]
impl MeshProtocol for HttpProtocol {
    async fn send_agent(
        &self,
        agent: Arc<dyn ErasedAgent>,
        destination: &Location,
    ) -> MeshResult<RemoteAgentRef> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "send_agent");
        let result = self.send_agent_inner(agent, destination).await;
        if let Err(e) = &result {
            warn!(location = %destination, error = %e, "HTTP deploy failed");
        }
        timer.observe(result)
    }

    async fn call_remote_bytes(
        &self,
        reference: &RemoteAgentRef,
        input: Vec<u8>,
        timeout: Duration,
    ) -> MeshResult<Vec<u8>> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "call_remote_agent");
        let result = self.call_inner(reference, input, timeout).await;
        timer.observe(result)
    }

    async fn get_remote_agent(&self, _reference: &RemoteAgentRef) -> MeshResult<Option<AgentHandle>> {
        Ok(None)
    }

    async fn agent_exists(&self, reference: &RemoteAgentRef) -> MeshResult<bool> {
        let request = self
            .client
            .get(Self::url(&reference.location, &format!("/agents/{}", reference.id)));
        self.probe("agent_exists", reference, request).await
    }

    async fn undeploy_agent(&self, reference: &RemoteAgentRef) -> MeshResult<bool> {
        let request = self
            .client
            .delete(Self::url(&reference.location, &format!("/agents/{}", reference.id)));
        self.probe("undeploy_agent", reference, request).await
    }

    async fn send_and_receive(
        &self,
        location: &Location,
        envelope: MessageEnvelope,
    ) -> MeshResult<MessageEnvelope> {
        let timer = OperationTimer::start(self.recorder.as_ref(), COMPONENT, "send_and_receive");
        let result = self.exchange(location, &envelope).await;
        timer.observe(result)
    }

    async fn send(&self, location: &Location, envelope: MessageEnvelope) -> MeshResult<()> {
        let headers = envelope_headers(&envelope)?;
        let request = self
            .client
            .post(Self::url(location, "/messages"))
            .headers(headers)
            .body(envelope.payload)
            .timeout(self.call_timeout)
            .send();
        let location = location.clone();
        tokio::spawn(async move {
            if let Err(e) = request.await {
                warn!(location = %location, error = %e, "Fire-and-forget send failed");
            }
        });
        Ok(())
    }

    fn default_timeout(&self) -> Duration {
        self.call_timeout
    }
}
