//! API Configuration Module
//!
//! Node-level settings for the HTTP binding: where to listen, the address
//! other nodes should use to reach this one, CORS and request size limits.
//! Loaded from environment variables with development defaults. Mesh
//! behaviour (directory policy, queue sizes, timeouts) lives in
//! [`MeshConfig`], optionally loaded from the TOML file named here.

use agentmesh_core::{Location, MeshConfig, MeshError, MeshResult};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Default listen port for an agentmesh node.
pub const DEFAULT_PORT: u16 = 7400;

/// Default request body limit (16 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind_host: String,

    /// TCP port to bind.
    pub port: u16,

    /// Address placed in references to agents deployed here.
    /// Falls back to the bind host, or loopback when binding all interfaces.
    pub advertised_address: Option<String>,

    /// Optional TOML file holding a [`MeshConfig`].
    pub config_file: Option<PathBuf>,

    /// Allowed CORS origins. Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Upper bound on request bodies (agent descriptors, payloads, envelopes).
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            advertised_address: None,
            config_file: None,
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `AGENTMESH_BIND_HOST`: interface to bind (default: 0.0.0.0)
    /// - `AGENTMESH_PORT` or `PORT`: port to bind (default: 7400)
    /// - `AGENTMESH_ADVERTISED_ADDRESS`: address peers use to reach this node
    /// - `AGENTMESH_CONFIG_FILE`: path to a mesh TOML config
    /// - `AGENTMESH_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `AGENTMESH_CORS_MAX_AGE_SECS`: preflight cache duration (default: 86400)
    /// - `AGENTMESH_MAX_BODY_BYTES`: request body limit (default: 16 MiB)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_host = std::env::var("AGENTMESH_BIND_HOST")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.bind_host);

        let port = std::env::var("AGENTMESH_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.port);

        let advertised_address = std::env::var("AGENTMESH_ADVERTISED_ADDRESS")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let config_file = std::env::var("AGENTMESH_CONFIG_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let cors_origins = std::env::var("AGENTMESH_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = std::env::var("AGENTMESH_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let max_body_bytes = std::env::var("AGENTMESH_MAX_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.max_body_bytes);

        Self {
            bind_host,
            port,
            advertised_address,
            config_file,
            cors_origins,
            cors_max_age_secs,
            max_body_bytes,
        }
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> MeshResult<SocketAddr> {
        let host = if self.bind_host.eq_ignore_ascii_case("localhost") {
            "127.0.0.1"
        } else {
            self.bind_host.trim_start_matches('[').trim_end_matches(']')
        };
        let ip: IpAddr = host.parse().map_err(|e| {
            MeshError::Config(format!("invalid bind host '{}': {}", self.bind_host, e))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Location of this node as seen by its peers.
    pub fn advertised_location(&self) -> Location {
        let address = match &self.advertised_address {
            Some(address) => address.clone(),
            None if self.bind_host == "0.0.0.0" || self.bind_host == "::" => {
                "127.0.0.1".to_string()
            }
            None => self.bind_host.clone(),
        };
        Location::new(address, self.port)
    }

    /// Load the mesh configuration from `config_file`, or defaults when unset.
    pub fn load_mesh_config(&self) -> MeshResult<MeshConfig> {
        let Some(path) = &self.config_file else {
            return Ok(MeshConfig::default());
        };
        let source = std::fs::read_to_string(path).map_err(|e| {
            MeshError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        MeshConfig::from_toml_str(&source)
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.example.com
            if let Some(pattern) = allowed.strip_prefix("*.") {
                let host = origin
                    .strip_prefix("https://")
                    .or_else(|| origin.strip_prefix("http://"))
                    .unwrap_or(origin);
                return host.ends_with(&format!(".{}", pattern));
            }
            false
        })
    }
}
