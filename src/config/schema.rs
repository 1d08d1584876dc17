//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the tunnel client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TunnelConfig {
    /// The proxy to tunnel through.
    pub proxy: ProxySection,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Proxy endpoint and credentials.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySection {
    /// Proxy address (e.g., "127.0.0.1:3128" or "[::1]:3128").
    pub address: String,

    /// Tunnel scheme: "http" or "https".
    pub scheme: String,

    /// Username for Basic authentication. Requires `password`.
    pub username: Option<String>,

    /// Password for Basic authentication. Requires `username`.
    pub password: Option<String>,

    /// Extra headers sent with every CONNECT request.
    pub headers: BTreeMap<String, String>,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3128".to_string(),
            scheme: "http".to_string(),
            username: None,
            password: None,
            headers: BTreeMap::new(),
        }
    }
}

impl std::fmt::Debug for ProxySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxySection")
            .field("address", &self.address)
            .field("scheme", &self.scheme)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout in milliseconds. `0` waits as long as the OS does.
    pub connect_ms: u64,

    /// Time allowed for the proxy to answer CONNECT, in milliseconds.
    /// `0` disables the deadline.
    pub handshake_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            handshake_ms: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
