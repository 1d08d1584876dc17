//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyConnector::connect
//!     → TCP connect to the proxy (bounded by the connect timeout)
//!     → connector.rs feeds socket events into the handshake
//!     → connection.rs / pipeline.rs give the handshake its view of the socket
//!     → tunnel.rs hands the caller the stream plus any early tunnel bytes
//! ```
//!
//! # Design Decisions
//! - One task owns both the socket and the handshake; no locks
//! - Writes issued by the handshake are buffered and flushed by the driver
//! - Shutdown signals cancel an in-flight handshake

pub mod connection;
pub mod connector;
pub mod pipeline;
pub mod tunnel;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{AttemptId, Connection};
pub use connector::ProxyConnector;
pub use pipeline::{Pipeline, PipelineError};
pub use tunnel::Tunnel;
