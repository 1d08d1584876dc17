//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dial proxy:
//!     → timeouts.rs (connect deadline)
//! Handshake:
//!     → deadline owned by the handshake state machine
//! ```
//!
//! # Design Decisions
//! - Every network operation before the tunnel exists has a deadline
//! - No retries: a failed attempt is reported, a new attempt is the caller's call

pub mod timeouts;

pub use timeouts::{connect_with_timeout, ConnectError, DEFAULT_CONNECT_TIMEOUT};
