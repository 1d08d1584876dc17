//! Combined HTTP client codec with independently removable halves.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::handshake::protocol::HandshakeCodec;
use crate::http::request::{HttpRequestEncoder, RequestHead};
use crate::http::response::{HttpObject, HttpResponseDecoder};
use crate::http::CodecError;

/// Request encoder + response decoder sharing one pipeline stage.
///
/// Sent request methods are passed to the decoder so it can frame the
/// matching responses (a 2xx answer to CONNECT has no body).
#[derive(Debug)]
pub struct HttpClientCodec {
    encoder: Option<HttpRequestEncoder>,
    decoder: Option<HttpResponseDecoder>,
}

impl Default for HttpClientCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientCodec {
    pub fn new() -> Self {
        Self {
            encoder: Some(HttpRequestEncoder),
            decoder: Some(HttpResponseDecoder::new()),
        }
    }

    pub fn encoder(&self) -> Option<&HttpRequestEncoder> {
        self.encoder.as_ref()
    }

    pub fn decoder(&self) -> Option<&HttpResponseDecoder> {
        self.decoder.as_ref()
    }
}

impl Encoder<RequestHead> for HttpClientCodec {
    type Error = CodecError;

    fn encode(&mut self, item: RequestHead, dst: &mut BytesMut) -> Result<(), CodecError> {
        let encoder = self.encoder.as_mut().ok_or(CodecError::EncoderRemoved)?;
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.push_request_method(item.method.clone());
        }
        encoder.encode(item, dst)
    }
}

impl Decoder for HttpClientCodec {
    type Item = HttpObject;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<HttpObject>, CodecError> {
        self.decoder
            .as_mut()
            .ok_or(CodecError::DecoderRemoved)?
            .decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<HttpObject>, CodecError> {
        self.decoder
            .as_mut()
            .ok_or(CodecError::DecoderRemoved)?
            .decode_eof(src)
    }
}

impl HandshakeCodec for HttpClientCodec {
    type Request = RequestHead;
    type Response = HttpObject;
    type Error = CodecError;

    fn encode(&mut self, item: RequestHead, dst: &mut BytesMut) -> Result<(), CodecError> {
        Encoder::encode(self, item, dst)
    }

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<HttpObject>, CodecError> {
        Decoder::decode(self, src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<HttpObject>, CodecError> {
        Decoder::decode_eof(self, src)
    }

    fn remove_encoder(&mut self) -> bool {
        self.encoder.take().is_some()
    }

    fn remove_decoder(&mut self) -> bool {
        self.decoder.take().is_some()
    }

    fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Version};

    fn connect_head() -> RequestHead {
        RequestHead::new(Method::CONNECT, "example.com:443", Version::HTTP_10)
    }

    #[test]
    fn decoder_outlives_encoder() {
        let mut codec = HttpClientCodec::new();
        let mut out = BytesMut::new();
        Encoder::encode(&mut codec, connect_head(), &mut out).unwrap();

        assert!(HandshakeCodec::remove_encoder(&mut codec));
        assert!(!HandshakeCodec::remove_encoder(&mut codec));
        assert!(matches!(
            Encoder::encode(&mut codec, connect_head(), &mut out),
            Err(CodecError::EncoderRemoved)
        ));

        // The response only arrives after the encoder is gone.
        let mut src = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\n"[..]);
        assert!(matches!(
            Decoder::decode(&mut codec, &mut src).unwrap(),
            Some(HttpObject::Head(_))
        ));
        assert!(matches!(
            Decoder::decode(&mut codec, &mut src).unwrap(),
            Some(HttpObject::LastContent(_))
        ));
    }

    #[test]
    fn removed_decoder_refuses_input() {
        let mut codec = HttpClientCodec::new();
        assert!(codec.decoder().is_some());
        assert!(HandshakeCodec::remove_decoder(&mut codec));
        assert!(codec.decoder().is_none());
        assert!(codec.encoder().is_some());
        let mut src = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\n"[..]);
        assert!(matches!(
            Decoder::decode(&mut codec, &mut src),
            Err(CodecError::DecoderRemoved)
        ));
    }
}
