//! Handshake lifecycle states.
//!
//! # State Transitions
//! ```text
//! Connecting → AwaitingResponse: transport up, initial message written
//! Connecting → Failed: closed, cancelled or timed out before connect
//! AwaitingResponse → Succeeded: strategy reports the exchange finished
//! AwaitingResponse → Failed: violation, timeout, close, transport error
//! ```
//!
//! Succeeded and Failed are terminal.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the transport to connect to the proxy.
    Connecting,
    /// Initial message sent, collecting the proxy's response.
    AwaitingResponse,
    /// Tunnel established; writes pass straight through.
    Succeeded,
    /// Handshake failed; nothing is delivered any more.
    Failed,
}

impl HandshakeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakeState::Succeeded | HandshakeState::Failed)
    }

    /// Whether `next` is reachable from `self` in one step.
    pub fn can_transition_to(self, next: HandshakeState) -> bool {
        use HandshakeState::*;
        matches!(
            (self, next),
            (Connecting, AwaitingResponse)
                | (Connecting, Failed)
                | (AwaitingResponse, Succeeded)
                | (AwaitingResponse, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandshakeState::Connecting => "connecting",
            HandshakeState::AwaitingResponse => "awaiting_response",
            HandshakeState::Succeeded => "succeeded",
            HandshakeState::Failed => "failed",
        }
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::HandshakeState::*;

    #[test]
    fn terminal_states_have_no_exit() {
        for next in [Connecting, AwaitingResponse, Succeeded, Failed] {
            assert!(!Succeeded.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn connecting_cannot_skip_to_success() {
        assert!(!Connecting.can_transition_to(Succeeded));
        assert!(Connecting.can_transition_to(Failed));
        assert!(AwaitingResponse.can_transition_to(Succeeded));
    }
}
