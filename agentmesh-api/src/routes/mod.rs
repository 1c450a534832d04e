//! REST API Routes Module
//!
//! Assembles a node's router:
//! - `/agents`, `/messages`: the server side of the HTTP transport
//! - `/directory/agents`: directory queries and maintenance
//! - `/directory/events`: live directory events over WebSocket
//! - `/health`, `/metrics`: probes and Prometheus scraping

pub mod agents;
pub mod directory;
pub mod health;
pub mod messages;

use std::time::Duration;

use agentmesh_protocol::http::headers;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::ApiConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};
use crate::ws::events_handler;

pub use agents::create_router as agents_router;
pub use directory::create_router as directory_router;
pub use health::create_router as health_router;
pub use messages::create_router as messages_router;

/// Build the full router for one node.
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = build_cors_layer(config);

    Router::new()
        .nest("/agents", agents_router())
        .nest("/messages", messages_router())
        .nest("/directory/agents", directory_router())
        .route("/directory/events", get(events_handler))
        .nest("/health", health_router())
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(from_fn(observability_middleware))
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(headers::MESSAGE_TYPE),
            HeaderName::from_static(headers::MESSAGE_ID),
            HeaderName::from_static(headers::INPUT_TYPE),
        ])
        .expose_headers([
            HeaderName::from_static(headers::MESSAGE_TYPE),
            HeaderName::from_static(headers::MESSAGE_ID),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any).expose_headers(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let config = config.clone();
        cors.allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request| {
                origin
                    .to_str()
                    .map(|o| config.is_origin_allowed(o))
                    .unwrap_or(false)
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_core::{Location, MeshConfig, NoopRecorder};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router(config: &ApiConfig) -> Router {
        let state = AppState::build(
            MeshConfig::default(),
            Location::localhost(config.port),
            crate::builtin::builtin_catalog(),
            NoopRecorder::shared(),
        );
        create_router(state, config)
    }

    #[tokio::test]
    async fn test_cors_restricted_origin() -> Result<(), axum::http::Error> {
        let config = ApiConfig {
            cors_origins: vec!["*.mesh.example".to_string()],
            ..Default::default()
        };

        let allowed = router(&config)
            .oneshot(
                Request::get("/health/live")
                    .header(header::ORIGIN, "https://eu.mesh.example")
                    .body(Body::empty())?,
            )
            .await
            .map_err(|never| -> axum::http::Error { match never {} })?;
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(
            allowed
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("https://eu.mesh.example")
        );

        let denied = router(&config)
            .oneshot(
                Request::get("/health/live")
                    .header(header::ORIGIN, "https://evil.example")
                    .body(Body::empty())?,
            )
            .await
            .map_err(|never| -> axum::http::Error { match never {} })?;
        assert!(denied
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_body_limit() -> Result<(), axum::http::Error> {
        let config = ApiConfig {
            max_body_bytes: 64,
            ..Default::default()
        };
        let response = router(&config)
            .oneshot(
                Request::post("/agents")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(vec![b'x'; 1024]))?,
            )
            .await
            .map_err(|never| -> axum::http::Error { match never {} })?;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        Ok(())
    }
}
