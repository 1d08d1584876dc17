//! Response decoding.
//!
//! Emits one [`HttpObject::Head`], then zero or more [`HttpObject::Content`]
//! pieces, then exactly one [`HttpObject::LastContent`]. After that the
//! decoder stops consuming input; whatever follows belongs to the tunnel.
//!
//! Body framing, in order of precedence:
//! - no body: 1xx, 204, 304, responses to HEAD, 2xx responses to CONNECT
//! - `Transfer-Encoding: chunked` (extensions and trailers are skipped)
//! - `Content-Length`
//! - otherwise everything up to EOF

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Method, StatusCode, Version};
use tokio_util::codec::Decoder;

use crate::http::CodecError;

/// Largest accepted status line + headers, in bytes.
pub const MAX_HEAD_SIZE: usize = 8 * 1024;
pub const MAX_HEADERS: usize = 64;
const MAX_CHUNK_LINE: usize = 1024;

#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    /// Reason phrase as sent by the peer.
    pub reason: String,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// `<code> <reason>`, falling back to the canonical reason when the peer
    /// sent none.
    pub fn status_line(&self) -> String {
        let reason = if self.reason.is_empty() {
            self.status.canonical_reason().unwrap_or("")
        } else {
            self.reason.as_str()
        };
        format!("{} {}", self.status.as_u16(), reason).trim_end().to_string()
    }
}

#[derive(Debug, Clone)]
pub enum HttpObject {
    Head(ResponseHead),
    Content(Bytes),
    LastContent(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Head,
    Empty,
    Length(u64),
    Chunked(Chunk),
    UntilClose,
    Done,
}

#[derive(Debug)]
pub struct HttpResponseDecoder {
    state: State,
    /// Methods of requests still waiting for a response, oldest first.
    methods: VecDeque<Method>,
}

impl Default for HttpResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponseDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Head,
            methods: VecDeque::new(),
        }
    }

    /// Record the method of a request just sent; it decides the framing of
    /// the matching response.
    pub fn push_request_method(&mut self, method: Method) {
        self.methods.push_back(method);
    }

    /// True once the final piece of the response has been emitted.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    fn body_state(&mut self, head: &ResponseHead) -> Result<State, CodecError> {
        let status = head.status;
        if status.is_informational() {
            return Ok(State::Empty);
        }
        let method = self.methods.pop_front();

        if status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
            || method == Some(Method::HEAD)
            || (method == Some(Method::CONNECT) && status.is_success())
        {
            return Ok(State::Empty);
        }

        let chunked = head
            .headers
            .get_all(TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("chunked")));
        if chunked {
            return Ok(State::Chunked(Chunk::Size));
        }

        if let Some(value) = head.headers.get(CONTENT_LENGTH) {
            let len = value
                .to_str()
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .ok_or(CodecError::InvalidContentLength)?;
            return Ok(if len == 0 { State::Empty } else { State::Length(len) });
        }

        Ok(State::UntilClose)
    }
}

impl Decoder for HttpResponseDecoder {
    type Item = HttpObject;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<HttpObject>, CodecError> {
        loop {
            match self.state {
                State::Head => {
                    let Some((head, len)) = parse_head(src)? else {
                        return Ok(None);
                    };
                    src.advance(len);
                    self.state = self.body_state(&head)?;
                    return Ok(Some(HttpObject::Head(head)));
                }
                State::Empty => {
                    self.state = State::Done;
                    return Ok(Some(HttpObject::LastContent(Bytes::new())));
                }
                State::Length(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(src.len() as u64);
                    let data = src.split_to(take as usize).freeze();
                    let left = remaining - take;
                    if left == 0 {
                        self.state = State::Done;
                        return Ok(Some(HttpObject::LastContent(data)));
                    }
                    self.state = State::Length(left);
                    return Ok(Some(HttpObject::Content(data)));
                }
                State::Chunked(Chunk::Size) => {
                    let Some(line) = take_line(src, MAX_CHUNK_LINE)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    self.state = State::Chunked(if size == 0 {
                        Chunk::Trailers
                    } else {
                        Chunk::Data(size)
                    });
                }
                State::Chunked(Chunk::Data(remaining)) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(src.len() as u64);
                    let data = src.split_to(take as usize).freeze();
                    let left = remaining - take;
                    self.state = State::Chunked(if left == 0 {
                        Chunk::DataEnd
                    } else {
                        Chunk::Data(left)
                    });
                    return Ok(Some(HttpObject::Content(data)));
                }
                State::Chunked(Chunk::DataEnd) => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if &src[..2] != b"\r\n" {
                        return Err(CodecError::InvalidChunk);
                    }
                    src.advance(2);
                    self.state = State::Chunked(Chunk::Size);
                }
                State::Chunked(Chunk::Trailers) => {
                    let Some(line) = take_line(src, MAX_HEAD_SIZE)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.state = State::Done;
                        return Ok(Some(HttpObject::LastContent(Bytes::new())));
                    }
                }
                State::UntilClose => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(HttpObject::Content(src.split().freeze())));
                }
                State::Done => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<HttpObject>, CodecError> {
        match self.state {
            State::UntilClose => {
                self.state = State::Done;
                Ok(Some(HttpObject::LastContent(src.split().freeze())))
            }
            // A truncated head or body cannot be completed; the caller sees
            // the close itself.
            _ => self.decode(src),
        }
    }
}

fn parse_head(src: &[u8]) -> Result<Option<(ResponseHead, usize)>, CodecError> {
    if src.is_empty() {
        return Ok(None);
    }
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut headers);
    let len = match res.parse(src)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => {
            if src.len() > MAX_HEAD_SIZE {
                return Err(CodecError::HeadTooLarge(MAX_HEAD_SIZE));
            }
            return Ok(None);
        }
    };
    if len > MAX_HEAD_SIZE {
        return Err(CodecError::HeadTooLarge(MAX_HEAD_SIZE));
    }

    let code = res.code.unwrap_or_default();
    let status = StatusCode::from_u16(code).map_err(|_| CodecError::InvalidStatus(code))?;
    let version = match res.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut map = HeaderMap::with_capacity(res.headers.len());
    for header in res.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| CodecError::InvalidHeader(header.name.to_string()))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|_| CodecError::InvalidHeader(header.name.to_string()))?;
        map.append(name, value);
    }

    let head = ResponseHead {
        version,
        status,
        reason: res.reason.unwrap_or("").to_string(),
        headers: map,
    };
    Ok(Some((head, len)))
}

/// Split off one CRLF-terminated line, without the terminator.
fn take_line(src: &mut BytesMut, limit: usize) -> Result<Option<BytesMut>, CodecError> {
    match src.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => {
            let line = src.split_to(pos);
            src.advance(2);
            Ok(Some(line))
        }
        None if src.len() > limit => Err(CodecError::InvalidChunk),
        None => Ok(None),
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, CodecError> {
    let text = std::str::from_utf8(line).map_err(|_| CodecError::InvalidChunk)?;
    let size = text.split(';').next().unwrap_or("").trim();
    u64::from_str_radix(size, 16).map_err(|_| CodecError::InvalidChunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut HttpResponseDecoder, src: &mut BytesMut) -> Vec<HttpObject> {
        let mut out = Vec::new();
        while let Some(obj) = decoder.decode(src).unwrap() {
            out.push(obj);
        }
        out
    }

    fn connect_decoder() -> HttpResponseDecoder {
        let mut decoder = HttpResponseDecoder::new();
        decoder.push_request_method(Method::CONNECT);
        decoder
    }

    #[test]
    fn connect_success_has_no_body_and_leaves_tunnel_bytes() {
        let mut decoder = connect_decoder();
        let mut src = BytesMut::from(&b"HTTP/1.0 200 Connection Established\r\n\r\nSSH-2.0-OpenSSH"[..]);

        let objs = decode_all(&mut decoder, &mut src);
        assert_eq!(objs.len(), 2);
        match &objs[0] {
            HttpObject::Head(head) => {
                assert_eq!(head.status, StatusCode::OK);
                assert_eq!(head.version, Version::HTTP_10);
                assert_eq!(head.status_line(), "200 Connection Established");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&objs[1], HttpObject::LastContent(b) if b.is_empty()));
        assert!(decoder.is_done());
        assert_eq!(&src[..], b"SSH-2.0-OpenSSH");
    }

    #[test]
    fn head_split_across_reads() {
        let mut decoder = connect_decoder();
        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\nVia: 1.1 sq"[..]);
        assert!(decoder.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(b"uid\r\n\r\n");
        assert!(matches!(decoder.decode(&mut src).unwrap(), Some(HttpObject::Head(_))));
    }

    #[test]
    fn content_length_body() {
        let mut decoder = connect_decoder();
        let mut src = BytesMut::from(
            &b"HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 6\r\n\r\nden"[..],
        );
        let objs = decode_all(&mut decoder, &mut src);
        assert_eq!(objs.len(), 2);
        assert!(matches!(&objs[1], HttpObject::Content(b) if b == "den"));

        src.extend_from_slice(b"iedextra");
        let objs = decode_all(&mut decoder, &mut src);
        assert_eq!(objs.len(), 1);
        assert!(matches!(&objs[0], HttpObject::LastContent(b) if b == "ied"));
        assert_eq!(&src[..], b"extra");
    }

    #[test]
    fn chunked_body() {
        let mut decoder = connect_decoder();
        let mut src = BytesMut::from(
            &b"HTTP/1.1 502 Bad Gateway\r\nTransfer-Encoding: chunked\r\n\r\n\
               4;ext=1\r\nWiki\r\n5\r\npedia\r\n0\r\nX-Trailer: y\r\n\r\n"[..],
        );
        let objs = decode_all(&mut decoder, &mut src);
        let pieces: Vec<_> = objs
            .iter()
            .map(|o| match o {
                HttpObject::Head(h) => format!("head {}", h.status.as_u16()),
                HttpObject::Content(b) => format!("content {}", String::from_utf8_lossy(b)),
                HttpObject::LastContent(b) => format!("last {}", b.len()),
            })
            .collect();
        assert_eq!(pieces, vec!["head 502", "content Wiki", "content pedia", "last 0"]);
    }

    #[test]
    fn body_until_close() {
        let mut decoder = connect_decoder();
        let mut src = BytesMut::from(&b"HTTP/1.0 403 Forbidden\r\n\r\nno"[..]);
        let objs = decode_all(&mut decoder, &mut src);
        assert_eq!(objs.len(), 2);
        assert!(matches!(&objs[1], HttpObject::Content(b) if b == "no"));

        src.extend_from_slice(b"pe");
        match decoder.decode_eof(&mut src).unwrap() {
            Some(HttpObject::LastContent(b)) => assert_eq!(b, "pe"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(decoder.decode_eof(&mut src).unwrap().is_none());
    }

    #[test]
    fn informational_response_is_complete_on_its_own() {
        let mut decoder = connect_decoder();
        let mut src = BytesMut::from(&b"HTTP/1.1 100 Continue\r\n\r\n"[..]);
        let objs = decode_all(&mut decoder, &mut src);
        assert_eq!(objs.len(), 2);
        assert!(matches!(&objs[1], HttpObject::LastContent(_)));
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut decoder = connect_decoder();
        let mut src = BytesMut::from(&b"HTTP/1.1 200 OK\r\n"[..]);
        src.extend_from_slice(format!("X-Big: {}\r\n", "a".repeat(MAX_HEAD_SIZE)).as_bytes());
        assert!(matches!(
            decoder.decode(&mut src),
            Err(CodecError::HeadTooLarge(_))
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let mut decoder = connect_decoder();
        let mut src = BytesMut::from(&b"SSH-2.0-OpenSSH_9.6\r\n"[..]);
        assert!(matches!(decoder.decode(&mut src), Err(CodecError::Parse(_))));
    }
}
