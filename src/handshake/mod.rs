//! Proxy handshake subsystem.
//!
//! # Data Flow
//! ```text
//! Transport connected
//!     → machine.rs installs the protocol codec, sends the initial message
//!     → protocol.rs (strategy) interprets each decoded response
//!     → success: codec removed, queued writes released, outcome Ok
//!     → failure: codec removed, queued writes failed, outcome Err, close
//!
//! States:
//!     Connecting → AwaitingResponse → Succeeded | Failed
//! ```
//!
//! # Design Decisions
//! - The state machine performs no I/O; `net::connector` drives it on tokio
//! - Protocol strategies know nothing about buffering or timeouts
//! - Every error message carries the protocol, auth scheme, proxy and destination

pub mod context;
pub mod error;
pub mod machine;
pub mod outcome;
pub mod pending;
pub mod protocol;
pub mod state;

pub use context::{DestinationTarget, HandshakeContext, ProxyConnectionEvent, ProxyEndpoint};
pub use error::{HandshakeError, HandshakeResult};
pub use machine::{ProxyHandshake, DEFAULT_HANDSHAKE_TIMEOUT};
pub use outcome::{ConnectFuture, HandshakeOutcome};
pub use pending::{WriteCompletion, WritePromise};
pub use protocol::{HandshakeCodec, HandshakeProtocol, AUTH_NONE};
pub use state::HandshakeState;
