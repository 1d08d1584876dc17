//! Endpoints and per-attempt context.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::handshake::error::HandshakeError;

/// The proxy the connection is actually made to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEndpoint {
    /// Internet endpoint. `host` is kept exactly as configured (name or IP).
    Inet { host: String, port: u16 },
    /// Non-IP endpoint, e.g. a local proxy listening on a Unix socket.
    Unix(PathBuf),
}

impl ProxyEndpoint {
    /// Build an internet endpoint.
    pub fn inet(host: impl Into<String>, port: u16) -> Self {
        ProxyEndpoint::Inet {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` or `[v6]:port`.
    pub fn parse(value: &str) -> Result<Self, HandshakeError> {
        let (host, port) = split_host_port(value).ok_or_else(|| {
            HandshakeError::InvalidConfiguration(format!(
                "proxy address must be host:port, got {value:?}"
            ))
        })?;
        Ok(ProxyEndpoint::inet(host, port))
    }

    /// Value for the `Host` header, present only for internet endpoints.
    pub fn host_header(&self) -> Option<String> {
        match self {
            ProxyEndpoint::Inet { host, port } => Some(format_authority(host, *port)),
            ProxyEndpoint::Unix(_) => None,
        }
    }
}

impl From<SocketAddr> for ProxyEndpoint {
    fn from(addr: SocketAddr) -> Self {
        ProxyEndpoint::inet(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyEndpoint::Inet { host, port } => f.write_str(&format_authority(host, *port)),
            ProxyEndpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Where the tunnel should finally lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationTarget {
    /// Already resolved; rendered with the IP literal.
    Resolved(SocketAddr),
    /// Not resolved locally; the proxy does the lookup.
    Unresolved { host: String, port: u16 },
}

impl DestinationTarget {
    pub fn unresolved(host: impl Into<String>, port: u16) -> Self {
        DestinationTarget::Unresolved {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`. IP literals become [`DestinationTarget::Resolved`]
    /// without any lookup; everything else stays unresolved.
    pub fn parse(value: &str) -> Result<Self, HandshakeError> {
        let (host, port) = split_host_port(value).ok_or_else(|| {
            HandshakeError::InvalidConfiguration(format!(
                "destination must be host:port, got {value:?}"
            ))
        })?;
        Ok(match host.parse::<IpAddr>() {
            Ok(ip) => DestinationTarget::Resolved(SocketAddr::new(ip, port)),
            Err(_) => DestinationTarget::Unresolved { host, port },
        })
    }

    /// Textual host used in the request target.
    pub fn host(&self) -> String {
        match self {
            DestinationTarget::Resolved(addr) => addr.ip().to_string(),
            DestinationTarget::Unresolved { host, .. } => host.clone(),
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            DestinationTarget::Resolved(addr) => addr.port(),
            DestinationTarget::Unresolved { port, .. } => *port,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, DestinationTarget::Resolved(_))
    }

    /// `<host>:<port>`, IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        format_authority(&self.host(), self.port())
    }
}

impl From<SocketAddr> for DestinationTarget {
    fn from(addr: SocketAddr) -> Self {
        DestinationTarget::Resolved(addr)
    }
}

impl fmt::Display for DestinationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

/// Identity of one handshake attempt, shared with the protocol strategy and
/// used to prefix every handshake-phase error.
#[derive(Debug, Clone)]
pub struct HandshakeContext {
    protocol: String,
    auth_scheme: String,
    proxy: ProxyEndpoint,
    destination: DestinationTarget,
}

impl HandshakeContext {
    pub fn new(
        protocol: impl Into<String>,
        auth_scheme: impl Into<String>,
        proxy: ProxyEndpoint,
        destination: DestinationTarget,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            auth_scheme: auth_scheme.into(),
            proxy,
            destination,
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn auth_scheme(&self) -> &str {
        &self.auth_scheme
    }

    pub fn proxy(&self) -> &ProxyEndpoint {
        &self.proxy
    }

    pub fn destination(&self) -> &DestinationTarget {
        &self.destination
    }

    /// `<protocol>, <auth-scheme>, <proxy> => <destination>`
    pub fn describe(&self) -> String {
        format!(
            "{}, {}, {} => {}",
            self.protocol, self.auth_scheme, self.proxy, self.destination
        )
    }

    pub fn violation(&self, reason: impl Into<String>) -> HandshakeError {
        HandshakeError::ProtocolViolation {
            context: self.describe(),
            reason: reason.into(),
        }
    }

    pub fn timeout(&self, timeout: Duration) -> HandshakeError {
        HandshakeError::HandshakeTimeout {
            context: self.describe(),
            timeout,
        }
    }

    pub fn closed_early(&self) -> HandshakeError {
        HandshakeError::ConnectionClosedEarly {
            context: self.describe(),
        }
    }

    pub fn transport(&self, message: impl fmt::Display) -> HandshakeError {
        HandshakeError::Transport {
            context: self.describe(),
            message: message.to_string(),
        }
    }

    pub fn codec_removal(&self) -> HandshakeError {
        HandshakeError::CodecRemoval {
            context: self.describe(),
        }
    }
}

/// Published to the connection once the tunnel is up, before any queued
/// write is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConnectionEvent {
    pub protocol: String,
    pub auth_scheme: String,
    pub proxy: ProxyEndpoint,
    pub destination: DestinationTarget,
}

impl From<&HandshakeContext> for ProxyConnectionEvent {
    fn from(ctx: &HandshakeContext) -> Self {
        Self {
            protocol: ctx.protocol.clone(),
            auth_scheme: ctx.auth_scheme.clone(),
            proxy: ctx.proxy.clone(),
            destination: ctx.destination.clone(),
        }
    }
}

fn format_authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn split_host_port(value: &str) -> Option<(String, u16)> {
    let (host, port) = value.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() || (host.contains(':') && !value.starts_with('[')) {
        return None;
    }
    Some((host.to_string(), port))
}
