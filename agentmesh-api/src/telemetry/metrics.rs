//! Prometheus Metrics Definitions
//!
//! Defines the node's metrics with their labels and types, and exposes a
//! /metrics endpoint for Prometheus scraping. [`MeshMetrics`] is also the
//! [`OperationRecorder`] handed to the directory, host and transports, so
//! every mesh operation shows up as a counter and a latency histogram.

use agentmesh_core::{NoopRecorder, OperationRecorder, SharedRecorder};
use agentmesh_directory::AgentDirectory;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Mesh operation latency buckets (seconds). Directory operations sit at the
/// bottom; remote calls reach the top.
const OPERATION_LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0, 30.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<MeshMetrics>> = Lazy::new(MeshMetrics::new);

/// Container for all node metrics.
#[derive(Clone)]
pub struct MeshMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Mesh operation counter - labels: component, operation, status
    pub operations_total: CounterVec,

    /// Mesh operation duration histogram - labels: component, operation
    pub operation_duration_seconds: HistogramVec,

    /// Current event stream WebSocket connections
    pub websocket_connections: Gauge,

    /// Agents in the directory, any status
    pub registered_agents: Gauge,

    /// Agents in the directory with status Active
    pub active_agents: Gauge,
}

impl MeshMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "agentmesh_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "agentmesh_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            operations_total: register_counter_vec!(
                "agentmesh_operations_total",
                "Total number of directory, host and protocol operations",
                &["component", "operation", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register operations_total: {}", e)))?,

            operation_duration_seconds: register_histogram_vec!(
                "agentmesh_operation_duration_seconds",
                "Directory, host and protocol operation duration in seconds",
                &["component", "operation"],
                OPERATION_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register operation_duration_seconds: {}", e)))?,

            websocket_connections: register_gauge!(
                "agentmesh_websocket_connections",
                "Current number of directory event stream connections"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register websocket_connections: {}", e)))?,

            registered_agents: register_gauge!(
                "agentmesh_registered_agents",
                "Agents currently in the directory"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register registered_agents: {}", e)))?,

            active_agents: register_gauge!(
                "agentmesh_active_agents",
                "Agents currently in the directory with status Active"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register active_agents: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a directory, host or protocol operation.
    pub fn record_operation(
        &self,
        component: &str,
        operation: &str,
        success: bool,
        duration_secs: f64,
    ) {
        let status = if success { "success" } else { "error" };
        self.operations_total
            .with_label_values(&[component, operation, status])
            .inc();
        self.operation_duration_seconds
            .with_label_values(&[component, operation])
            .observe(duration_secs);
    }

    /// Increment WebSocket connection count.
    pub fn ws_connected(&self) {
        self.websocket_connections.inc();
    }

    /// Decrement WebSocket connection count.
    pub fn ws_disconnected(&self) {
        self.websocket_connections.dec();
    }

    /// Refresh the agent gauges from the directory.
    pub fn set_agent_counts(&self, registered: usize, active: usize) {
        self.registered_agents.set(registered as f64);
        self.active_agents.set(active as f64);
    }
}

impl OperationRecorder for MeshMetrics {
    fn record(&self, component: &'static str, operation: &'static str, success: bool, duration: Duration) {
        self.record_operation(component, operation, success, duration.as_secs_f64());
    }
}

/// Recorder backed by the global metrics, or a no-op when they failed to
/// register.
pub fn shared_recorder() -> SharedRecorder {
    match METRICS.as_ref() {
        Ok(metrics) => Arc::new(metrics.clone()),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics unavailable, operations will not be recorded");
            NoopRecorder::shared()
        }
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler(State(directory): State<Arc<dyn AgentDirectory>>) -> impl IntoResponse {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.set_agent_counts(directory.agent_count(), directory.active_count());
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
