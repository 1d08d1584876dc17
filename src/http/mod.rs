//! HTTP CONNECT handshake.
//!
//! # Data Flow
//! ```text
//! ProxyHandshake::on_connected
//!     → connect.rs builds `CONNECT host:port HTTP/1.0` (+ Host, Proxy-Authorization)
//!     → codec.rs / request.rs encode it to bytes
//!
//! Inbound bytes
//!     → codec.rs / response.rs decode Head, Content…, LastContent
//!     → connect.rs records the status and decides on LastContent
//! ```
//!
//! # Design Decisions
//! - Only status 200 opens the tunnel
//! - The credential header is computed once per settings value and shared
//! - The codec lives in the pipeline only for the duration of the handshake

use thiserror::Error;

pub mod auth;
pub mod codec;
pub mod connect;
pub mod request;
pub mod response;

pub use auth::encode_basic_auth;
pub use codec::HttpClientCodec;
pub use connect::{HttpConnectProtocol, HttpConnectSettings, ProxyScheme};
pub use request::RequestHead;
pub use response::{HttpObject, ResponseHead};

/// Errors raised by the HTTP/1.x codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Parse(#[from] httparse::Error),

    #[error("response head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("invalid content-length")]
    InvalidContentLength,

    #[error("malformed chunked body")]
    InvalidChunk,

    #[error("unsupported HTTP version {0}")]
    UnsupportedVersion(String),

    #[error("request encoder already removed")]
    EncoderRemoved,

    #[error("response decoder already removed")]
    DecoderRemoved,
}
