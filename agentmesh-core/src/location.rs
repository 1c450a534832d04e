//! Network endpoints that host agents.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A network endpoint (host + port) hosting agents.
///
/// Pure value type: equality is by value and a `Location` is never mutated
/// after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Hostname or IP literal (IPv6 without brackets)
    pub address: String,
    /// TCP port
    pub port: u16,
}

impl Location {
    /// Create a location from an address and port.
    ///
    /// A bracketed IPv6 literal such as `[::1]` is stored unbracketed.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        let address = address.into();
        let address = match address
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            Some(inner) => inner.to_string(),
            None => address,
        };
        Self { address, port }
    }

    /// Loopback location on the given port.
    pub fn localhost(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }

    /// True iff the address is a loopback address.
    pub fn is_local(&self) -> bool {
        if self.address.eq_ignore_ascii_case("localhost") {
            return true;
        }
        self.address
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }

    /// `host:port` authority, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// Base URL for the HTTP binding at this location.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.authority())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

impl FromStr for Location {
    type Err = ValidationError;

    /// Parse `host:port` or `[v6]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidValue {
            field: "location".to_string(),
            reason: format!("'{}': {}", s, reason),
        };

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 literal"))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| invalid("missing port"))?;
            (host, port)
        } else {
            s.rsplit_once(':').ok_or_else(|| invalid("missing port"))?
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid("port must be an integer in 0..=65535"))?;

        Ok(Location::new(host, port))
    }
}
