//! Handshake error taxonomy.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while constructing or running a proxy handshake.
///
/// Every handshake-phase variant carries a `context` prefix of the form
/// `<protocol>, <auth-scheme>, <proxy> => <destination>` so a failure can be
/// traced back to the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Unsupported protocol scheme or otherwise unusable settings.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Only one half of the username/password pair was supplied.
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    /// The proxy answered with an unexpected or malformed response sequence.
    #[error("{context}, {reason}")]
    ProtocolViolation { context: String, reason: String },

    /// No terminal response arrived before the deadline.
    #[error("{context}, timeout after {}ms", .timeout.as_millis())]
    HandshakeTimeout { context: String, timeout: Duration },

    /// The transport went away (or the attempt was cancelled) before the
    /// handshake resolved.
    #[error("{context}, disconnected")]
    ConnectionClosedEarly { context: String },

    /// I/O or decode failure on the transport during the handshake.
    #[error("{context}, {message}")]
    Transport { context: String, message: String },

    /// The protocol codec could not be taken out of the pipeline after a
    /// successful exchange.
    #[error("{context}, failed to remove all codec stages added by the proxy handshake")]
    CodecRemoval { context: String },
}

impl HandshakeError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            HandshakeError::InvalidConfiguration(_) => "invalid_configuration",
            HandshakeError::MissingCredential(_) => "missing_credential",
            HandshakeError::ProtocolViolation { .. } => "protocol_violation",
            HandshakeError::HandshakeTimeout { .. } => "timeout",
            HandshakeError::ConnectionClosedEarly { .. } => "closed_early",
            HandshakeError::Transport { .. } => "transport",
            HandshakeError::CodecRemoval { .. } => "codec_removal",
        }
    }

    /// True for errors raised before any connection is attempted.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HandshakeError::InvalidConfiguration(_) | HandshakeError::MissingCredential(_)
        )
    }
}

/// Result type for handshake operations.
pub type HandshakeResult<T> = Result<T, HandshakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_message_carries_context() {
        let err = HandshakeError::ProtocolViolation {
            context: "http, none, proxy:3128 => example.com:443".into(),
            reason: "status: 407 Proxy Authentication Required".into(),
        };
        assert_eq!(
            err.to_string(),
            "http, none, proxy:3128 => example.com:443, status: 407 Proxy Authentication Required"
        );
        assert_eq!(err.kind(), "protocol_violation");
        assert!(!err.is_configuration());
    }

    #[test]
    fn timeout_message_reports_deadline() {
        let err = HandshakeError::HandshakeTimeout {
            context: "http, basic, proxy:3128 => db:5432".into(),
            timeout: Duration::from_millis(250),
        };
        assert!(err.to_string().ends_with("timeout after 250ms"));
    }

    #[test]
    fn configuration_errors_are_flagged() {
        assert!(HandshakeError::MissingCredential("password").is_configuration());
        assert!(HandshakeError::InvalidConfiguration("scheme".into()).is_configuration());
    }
}
