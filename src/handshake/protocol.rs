//! Handshake protocol strategy contract.
//!
//! A protocol supplies its wire codec, its initial message and the rules for
//! interpreting responses. Everything else (ordering, timeouts, buffering,
//! outcome delivery) belongs to [`ProxyHandshake`](super::machine::ProxyHandshake).

use std::any::Any;

use bytes::BytesMut;

use crate::handshake::context::HandshakeContext;
use crate::handshake::error::HandshakeError;
use crate::net::connection::Connection;
use crate::net::pipeline::PipelineError;

pub const AUTH_NONE: &str = "none";

/// A duplex codec whose encoder and decoder halves can be removed one at a
/// time. The decoder may have to outlive the encoder to finish parsing a
/// response that arrives after the last write.
pub trait HandshakeCodec: Any + Send {
    type Request;
    type Response;
    type Error: std::fmt::Display;

    fn encode(&mut self, item: Self::Request, dst: &mut BytesMut) -> Result<(), Self::Error>;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Response>, Self::Error>;

    /// Decode whatever can still be produced once the peer has closed.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Response>, Self::Error>;

    /// Drop the encoder half. Returns false if it was already gone.
    fn remove_encoder(&mut self) -> bool;

    /// Drop the decoder half. Returns false if it was already gone.
    fn remove_decoder(&mut self) -> bool;

    fn has_encoder(&self) -> bool;

    fn has_decoder(&self) -> bool;
}

/// Per-protocol half of the handshake.
///
/// One value serves exactly one attempt; response state it accumulates is
/// never reset for reuse.
pub trait HandshakeProtocol: Send {
    type Codec: HandshakeCodec;

    /// Tunnel protocol name, e.g. `"http"`.
    fn protocol(&self) -> &str;

    /// `"none"` or the authentication scheme in use.
    fn auth_scheme(&self) -> &str;

    fn new_codec(&self) -> Self::Codec;

    /// Build the single handshake-initiation message.
    fn new_initial_message(
        &self,
        ctx: &HandshakeContext,
    ) -> Result<<Self::Codec as HandshakeCodec>::Request, HandshakeError>;

    /// Interpret one inbound message. `Ok(true)` means the exchange finished
    /// successfully.
    fn handle_response(
        &mut self,
        ctx: &HandshakeContext,
        response: <Self::Codec as HandshakeCodec>::Response,
    ) -> Result<bool, HandshakeError>;

    /// Pipeline name of the codec stage for a handshake stage called `base`.
    fn codec_name(&self, base: &str) -> String {
        format!("{base}.codec")
    }

    /// Insert the codec right before the handshake stage.
    fn install_codec(&self, conn: &mut dyn Connection) -> Result<(), PipelineError> {
        let base = conn.handler_name().to_string();
        let name = self.codec_name(&base);
        conn.pipeline().add_before(&base, name, self.new_codec())
    }

    fn remove_encoder(&self, conn: &mut dyn Connection) -> Result<(), PipelineError> {
        self.remove_half(conn, |codec| codec.remove_encoder())
    }

    fn remove_decoder(&self, conn: &mut dyn Connection) -> Result<(), PipelineError> {
        self.remove_half(conn, |codec| codec.remove_decoder())
    }

    /// Remove one half; the stage leaves the pipeline once both are gone.
    #[doc(hidden)]
    fn remove_half(
        &self,
        conn: &mut dyn Connection,
        remove: fn(&mut Self::Codec) -> bool,
    ) -> Result<(), PipelineError> {
        let name = self.codec_name(conn.handler_name());
        let pipeline = conn.pipeline();
        let codec = pipeline.get_mut::<Self::Codec>(&name)?;
        remove(codec);
        if !codec.has_encoder() && !codec.has_decoder() {
            pipeline.remove(&name)?;
        }
        Ok(())
    }
}
