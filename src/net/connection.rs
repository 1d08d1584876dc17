//! Connection-side contract seen by the handshake state machine.
//!
//! # Responsibilities
//! - Expose the pipeline so protocol codecs can be installed and removed
//! - Accept outbound bytes headed for the proxy (or, later, the destination)
//! - Deliver post-handshake inbound bytes to the application
//! - Close the transport when the handshake fails

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::handshake::context::ProxyConnectionEvent;
use crate::handshake::pending::WritePromise;
use crate::net::pipeline::Pipeline;

/// Global atomic counter for attempt IDs.
/// Relaxed ordering is enough; only uniqueness matters.
static ATTEMPT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one handshake attempt, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn new() -> Self {
        Self(ATTEMPT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hs-{}", self.0)
    }
}

/// The transport a handshake runs on.
///
/// Calls are serialized by the owner; implementations need no locking.
pub trait Connection {
    /// Pipeline name of the handshake stage itself. Codecs are installed
    /// relative to it.
    fn handler_name(&self) -> &str;

    fn pipeline(&mut self) -> &mut Pipeline;

    /// Queue bytes for the wire. The promise is completed once the bytes are
    /// written (or the write fails).
    fn write(&mut self, data: Bytes, promise: WritePromise);

    fn flush(&mut self);

    /// Pass inbound bytes further up, past the handshake.
    fn fire_read(&mut self, data: Bytes);

    /// Called once the tunnel is up, before queued writes are released.
    fn fire_tunnel_established(&mut self, _event: &ProxyConnectionEvent) {}

    fn close(&mut self);
}
