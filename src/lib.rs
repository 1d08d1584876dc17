//! HTTP CONNECT proxy tunnel client library.
//!
//! A proxy handshake state machine, its HTTP CONNECT strategy and a tokio
//! driver that turns a TCP connection to a proxy into a tunnel to a
//! destination.

pub mod config;
pub mod handshake;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::schema::TunnelConfig;
pub use handshake::{DestinationTarget, HandshakeError, ProxyEndpoint, ProxyHandshake};
pub use http::{HttpConnectProtocol, HttpConnectSettings};
pub use lifecycle::Shutdown;
pub use net::{ProxyConnector, Tunnel};
