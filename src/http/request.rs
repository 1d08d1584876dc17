//! Request head and its encoder.

use bytes::{BufMut, BytesMut};
use http::{HeaderMap, Method, Version};
use tokio_util::codec::Encoder;

use crate::http::CodecError;

/// A body-less HTTP/1.x request.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Request target, written verbatim (authority form for CONNECT).
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, target: impl Into<String>, version: Version) -> Self {
        Self {
            method,
            target: target.into(),
            version,
            headers: HeaderMap::new(),
        }
    }
}

/// Serializes [`RequestHead`]s. Header names go out title-cased.
#[derive(Debug, Default)]
pub struct HttpRequestEncoder;

impl Encoder<RequestHead> for HttpRequestEncoder {
    type Error = CodecError;

    fn encode(&mut self, item: RequestHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let version = match item.version {
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_11 => "HTTP/1.1",
            other => return Err(CodecError::UnsupportedVersion(format!("{other:?}"))),
        };

        dst.reserve(64 + item.target.len() + item.headers.len() * 32);
        dst.put_slice(item.method.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(item.target.as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(version.as_bytes());
        dst.put_slice(b"\r\n");

        for (name, value) in item.headers.iter() {
            put_title_case(dst, name.as_str());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn put_title_case(dst: &mut BytesMut, name: &str) {
    let mut upper = true;
    for b in name.bytes() {
        dst.put_u8(if upper { b.to_ascii_uppercase() } else { b });
        upper = b == b'-';
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderValue, HOST, PROXY_AUTHORIZATION};

    #[test]
    fn encodes_connect_head() {
        let mut head = RequestHead::new(Method::CONNECT, "example.com:443", Version::HTTP_10);
        head.headers.insert(HOST, HeaderValue::from_static("proxy:3128"));
        head.headers
            .insert(PROXY_AUTHORIZATION, HeaderValue::from_static("Basic YWxpY2U6czNjcmV0"));

        let mut buf = BytesMut::new();
        HttpRequestEncoder.encode(head, &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            b"CONNECT example.com:443 HTTP/1.0\r\n\
              Host: proxy:3128\r\n\
              Proxy-Authorization: Basic YWxpY2U6czNjcmV0\r\n\
              \r\n"
        );
    }

    #[test]
    fn rejects_http2() {
        let head = RequestHead::new(Method::CONNECT, "x:1", Version::HTTP_2);
        let err = HttpRequestEncoder.encode(head, &mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion(_)));
    }
}
