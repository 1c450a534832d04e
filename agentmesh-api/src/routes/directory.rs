//! Directory REST API Routes
//!
//! Query and maintain this node's agent directory over HTTP:
//!
//! | Route                                   | Operation                   |
//! |-----------------------------------------|-----------------------------|
//! | `GET    /directory/agents`              | `discover_agents`           |
//! | `POST   /directory/agents`              | `register_with_status`      |
//! | `GET    /directory/agents/:id`          | `get_agent_info`            |
//! | `DELETE /directory/agents/:id`          | `unregister_agent`          |
//! | `PUT    /directory/agents/:id/status`   | `update_agent_status`       |
//! | `PUT    /directory/agents/:id/metadata` | `update_agent_metadata`     |
//! | `PUT    /directory/agents/:id/load`     | `update_agent_load_factor`  |
//! | `POST   /directory/agents/:id/heartbeat`| `heartbeat`                 |

use std::sync::Arc;

use agentmesh_core::{
    AgentId, AgentInfo, AgentMetadata, AgentQuery, AgentStatus, MeshError, RemoteAgentRef,
};
use agentmesh_directory::AgentDirectory;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAgentsResponse {
    pub agents: Vec<AgentInfo>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    #[serde(rename = "ref")]
    pub reference: RemoteAgentRef,
    pub metadata: AgentMetadata,
    /// Defaults to the directory's configured initial status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    /// Status name; case-insensitive, `_` and `-` ignored
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLoadRequest {
    /// `null` clears the reported load
    pub load_factor: Option<f64>,
}

/// Build a query from URL parameters.
///
/// - `capability` (or `capabilities`): repeatable, comma-separated
/// - `inputType`, `outputType`
/// - `property=key:value`: repeatable
/// - `limit`: defaults to `default_limit`
/// - `onlyActive`: `true` (default) or `false`
pub fn query_from_params(
    params: &[(String, String)],
    default_limit: usize,
) -> ApiResult<AgentQuery> {
    let mut query = AgentQuery::new().with_limit(default_limit);
    for (key, value) in params {
        match key.as_str() {
            "capability" | "capabilities" => {
                query = query.with_capabilities(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string),
                );
            }
            "inputType" => query = query.with_input_type(value.as_str()),
            "outputType" => query = query.with_output_type(value.as_str()),
            "property" => {
                let (k, v) = value
                    .split_once(':')
                    .ok_or_else(|| ApiError::invalid_format("property", "key:value"))?;
                query = query.with_property(k.trim(), v.trim());
            }
            "limit" => {
                let limit: usize = value
                    .parse()
                    .map_err(|_| ApiError::invalid_format("limit", "a positive integer"))?;
                query = query.with_limit(limit);
            }
            "onlyActive" => {
                let only_active: bool = value
                    .parse()
                    .map_err(|_| ApiError::invalid_format("onlyActive", "true or false"))?;
                if !only_active {
                    query = query.include_inactive();
                }
            }
            other => {
                return Err(ApiError::invalid_input(format!(
                    "Unknown query parameter '{}'",
                    other
                )));
            }
        }
    }
    Ok(query)
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /directory/agents - Discover agents
pub async fn list_agents(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult<Json<ListAgentsResponse>> {
    let query = query_from_params(&params, state.mesh_config.directory.default_query_limit)?;
    query
        .validate(state.max_query_limit())
        .map_err(MeshError::from)?;

    let agents = state.directory.discover_agents(&query);
    Ok(Json(ListAgentsResponse {
        total: agents.len(),
        agents,
    }))
}

/// POST /directory/agents - Register an agent hosted anywhere in the mesh
pub async fn register_agent(
    State(directory): State<Arc<dyn AgentDirectory>>,
    Json(req): Json<RegisterAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    let info = match req.status {
        Some(status) => directory.register_with_status(req.reference, req.metadata, status)?,
        None => directory.register_agent(req.reference, req.metadata)?,
    };
    Ok((StatusCode::CREATED, Json(info)))
}

/// GET /directory/agents/:id - One directory record
pub async fn get_agent_info(
    State(directory): State<Arc<dyn AgentDirectory>>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<AgentInfo>> {
    directory
        .get_agent_info(agent_id)
        .map(Json)
        .ok_or_else(|| ApiError::agent_not_found(agent_id))
}

/// DELETE /directory/agents/:id - Unregister
///
/// 404 when the id is unknown; the directory operation itself is idempotent.
pub async fn unregister_agent(
    State(directory): State<Arc<dyn AgentDirectory>>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<StatusCode> {
    directory
        .unregister_agent(agent_id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| ApiError::agent_not_found(agent_id))
}

/// PUT /directory/agents/:id/status
pub async fn update_status(
    State(directory): State<Arc<dyn AgentDirectory>>,
    Path(agent_id): Path<AgentId>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<AgentInfo>> {
    let status: AgentStatus = req.status.parse().map_err(MeshError::from)?;
    Ok(Json(directory.update_agent_status(agent_id, status)?))
}

/// PUT /directory/agents/:id/metadata
pub async fn update_metadata(
    State(directory): State<Arc<dyn AgentDirectory>>,
    Path(agent_id): Path<AgentId>,
    Json(metadata): Json<AgentMetadata>,
) -> ApiResult<Json<AgentInfo>> {
    Ok(Json(directory.update_agent_metadata(agent_id, metadata)?))
}

/// PUT /directory/agents/:id/load
pub async fn update_load(
    State(directory): State<Arc<dyn AgentDirectory>>,
    Path(agent_id): Path<AgentId>,
    Json(req): Json<UpdateLoadRequest>,
) -> ApiResult<Json<AgentInfo>> {
    Ok(Json(
        directory.update_agent_load_factor(agent_id, req.load_factor)?,
    ))
}

/// POST /directory/agents/:id/heartbeat
pub async fn heartbeat(
    State(directory): State<Arc<dyn AgentDirectory>>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<AgentInfo>> {
    Ok(Json(directory.heartbeat(agent_id)?))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_agents).post(register_agent))
        .route("/:agent_id", get(get_agent_info).delete(unregister_agent))
        .route("/:agent_id/status", put(update_status))
        .route("/:agent_id/metadata", put(update_metadata))
        .route("/:agent_id/load", put(update_load))
        .route("/:agent_id/heartbeat", post(heartbeat))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_query_from_params_defaults() -> ApiResult<()> {
        let query = query_from_params(&[], 10)?;
        assert!(query.capabilities.is_empty());
        assert_eq!(query.limit, 10);
        assert!(query.only_active);
        Ok(())
    }

    #[test]
    fn test_query_from_params_full() -> ApiResult<()> {
        let query = query_from_params(
            &params(&[
                ("capability", "nlp"),
                ("capability", "translation, summarize"),
                ("inputType", "string"),
                ("outputType", "string"),
                ("property", "language:English"),
                ("limit", "5"),
                ("onlyActive", "false"),
            ]),
            10,
        )?;
        assert_eq!(query.capabilities.len(), 3);
        assert!(query.capabilities.contains("summarize"));
        assert_eq!(query.input_type.as_deref(), Some("string"));
        assert_eq!(query.output_type.as_deref(), Some("string"));
        assert_eq!(query.properties.get("language").map(String::as_str), Some("English"));
        assert_eq!(query.limit, 5);
        assert!(!query.only_active);
        Ok(())
    }

    #[test]
    fn test_query_from_params_rejects_garbage() {
        let bad_limit = query_from_params(&params(&[("limit", "-1")]), 10);
        assert!(matches!(bad_limit, Err(e) if e.code == crate::error::ErrorCode::InvalidFormat));

        let bad_property = query_from_params(&params(&[("property", "language")]), 10);
        assert!(bad_property.is_err());

        let unknown = query_from_params(&params(&[("colour", "blue")]), 10);
        assert!(matches!(unknown, Err(e) if e.code == crate::error::ErrorCode::InvalidInput));
    }

    #[test]
    fn test_register_request_wire_shape() -> Result<(), serde_json::Error> {
        let json = serde_json::json!({
            "ref": {
                "id": "0191d2c5-7b3a-7cc0-9a51-1f2e3d4c5b6a",
                "location": { "address": "127.0.0.1", "port": 7400 },
                "inputType": "string",
                "outputType": "string"
            },
            "metadata": {
                "capabilities": ["nlp"],
                "inputType": "string",
                "outputType": "string"
            }
        });
        let req: RegisterAgentRequest = serde_json::from_value(json)?;
        assert_eq!(req.reference.location.port, 7400);
        assert!(req.status.is_none());
        Ok(())
    }
}
