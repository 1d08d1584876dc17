//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every subscriber wakes
//!     → an in-flight handshake is cancelled, an open relay stops
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; subscribers never send
//! - A second signal is not special: the first one already cancels everything

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_listener, wait_for_signal};
