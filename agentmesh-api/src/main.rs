//! agentmesh node entry point
//!
//! Loads configuration, builds the directory and agent host, and serves the
//! HTTP binding until Ctrl-C.

use agentmesh_api::telemetry::{init_tracing, shared_recorder, TelemetryConfig};
use agentmesh_api::{builtin_catalog, create_router, ApiConfig, ApiError, ApiResult, AppState};
use agentmesh_core::NoopRecorder;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let mesh_config = api_config.load_mesh_config()?;

    let recorder = if telemetry_config.metrics_enabled {
        shared_recorder()
    } else {
        NoopRecorder::shared()
    };

    let location = api_config.advertised_location();
    let state = AppState::build(mesh_config, location.clone(), builtin_catalog(), recorder);
    let app = create_router(state, &api_config);

    let addr = api_config.bind_addr()?;
    tracing::info!(%addr, advertised = %location, "Starting agentmesh node");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
