//! Raw envelope endpoint
//!
//! `POST /messages` carries one request envelope: the body is the payload,
//! `X-Message-Type`, `X-Message-Id` and `X-Metadata-*` carry the rest. The
//! reply envelope comes back the same way with status 200, including
//! `AGENT_NOT_FOUND` and error replies; only a malformed request envelope
//! is an HTTP error.

use std::sync::Arc;

use agentmesh_core::MeshError;
use agentmesh_protocol::{envelope_from_http, envelope_headers, AgentHost};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};

use crate::error::ApiResult;
use crate::state::AppState;

/// POST /messages - Answer one request envelope
pub async fn post_message(
    State(host): State<Arc<AgentHost>>,
    request_headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let request = envelope_from_http(&request_headers, body.to_vec())?;
    let reply = host.handle_envelope(request).await;
    let reply_headers = envelope_headers(&reply).map_err(MeshError::from)?;
    Ok((StatusCode::OK, reply_headers, reply.payload))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(post_message))
}
