//! agentmesh API - HTTP Binding and Node Server
//!
//! Serves one mesh node over HTTP with Axum:
//!
//! - the server side of [`HttpProtocol`](agentmesh_protocol::HttpProtocol):
//!   deploy, call, probe and undeploy agents, plus raw envelope exchange
//! - REST access to the node's agent directory
//! - a WebSocket stream of directory events
//! - health probes and Prometheus metrics
//!
//! The `agentmesh-node` binary wires these together from environment
//! variables and an optional TOML mesh configuration.

pub mod builtin;
pub mod config;
pub mod error;
pub mod macros;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod ws;

pub use builtin::{builtin_catalog, EchoAgent, UppercaseAgent};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_router;
pub use state::AppState;
pub use ws::{StreamFrame, StreamNotice};
