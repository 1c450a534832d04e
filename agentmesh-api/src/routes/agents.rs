//! Agent hosting routes
//!
//! The server side of the HTTP transport: deploy, invoke, probe and remove
//! agents hosted at this node.

use std::sync::Arc;

use agentmesh_core::{AgentId, MeshError, RemoteAgentRef};
use agentmesh_protocol::{http::headers, AgentDescriptor, AgentHost, DeployResponse};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /agents - Rebuild an agent from its descriptor and host it here
pub async fn deploy_agent(
    State(host): State<Arc<AgentHost>>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let descriptor = AgentDescriptor::from_bytes(&body).map_err(MeshError::from)?;
    let reference = host.deploy(&descriptor)?;
    Ok((
        StatusCode::CREATED,
        Json(DeployResponse {
            agent_id: reference.id,
        }),
    ))
}

/// POST /agents/:id/call - Run a hosted agent on an encoded input
///
/// `X-Input-Type`, when present, must equal the agent's input tag.
pub async fn call_agent(
    State(host): State<Arc<AgentHost>>,
    Path(agent_id): Path<AgentId>,
    request_headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let input_type = request_headers
        .get(headers::INPUT_TYPE)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::invalid_format(headers::INPUT_TYPE, "an ASCII type tag"))
        })
        .transpose()?;
    debug!(agent_id = %agent_id, input_type = ?input_type, "Call request");

    let output = host.call(agent_id, input_type, &body).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        output,
    ))
}

/// GET /agents/:id - Reference to a hosted agent, 404 when absent
pub async fn get_agent(
    State(host): State<Arc<AgentHost>>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<RemoteAgentRef>> {
    host.reference_for(agent_id)
        .map(Json)
        .ok_or_else(|| ApiError::agent_not_found(agent_id))
}

/// DELETE /agents/:id - Stop hosting an agent
pub async fn undeploy_agent(
    State(host): State<Arc<AgentHost>>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<StatusCode> {
    if host.undeploy(agent_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::agent_not_found(agent_id))
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(deploy_agent))
        .route("/:agent_id", get(get_agent).delete(undeploy_agent))
        .route("/:agent_id/call", post(call_agent))
}
