//! Health Check Endpoints
//!
//! - /health/ping - Simple liveness check
//! - /health/live - Process alive check
//! - /health/ready - Directory, event feed and host summary

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

impl HealthStatus {
    fn severity(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub directory: ComponentHealth,
    pub events: ComponentHealth,
    pub host: ComponentHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_agents: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            agents: None,
            active_agents: None,
            subscribers: None,
            error: None,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check
///
/// Degraded when the directory holds agents but none of them is active.
/// Unhealthy (503) once the event feed's fan-out task has stopped.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let agents = state.directory.agent_count();
    let active = state.directory.active_count();

    let directory = ComponentHealth {
        status: if agents > 0 && active == 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        },
        agents: Some(agents),
        active_agents: Some(active),
        ..ComponentHealth::healthy()
    };
    let events = if state.events.is_running() {
        ComponentHealth {
            subscribers: Some(state.events.subscriber_count()),
            ..ComponentHealth::healthy()
        }
    } else {
        tracing::warn!("Event feed stopped, reporting not ready");
        ComponentHealth {
            status: HealthStatus::Unhealthy,
            error: Some("event feed stopped".to_string()),
            ..ComponentHealth::healthy()
        }
    };
    let host = ComponentHealth {
        agents: Some(state.host.deployed_count()),
        ..ComponentHealth::healthy()
    };

    let overall_status = directory.status.worst(events.status).worst(host.status);
    let response = HealthResponse {
        status: overall_status,
        message: None,
        details: Some(HealthDetails {
            directory,
            events,
            host,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if overall_status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}
