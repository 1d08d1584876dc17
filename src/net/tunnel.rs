//! Established tunnel stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::handshake::context::ProxyConnectionEvent;

/// A stream whose handshake with the proxy has completed.
///
/// Bytes the proxy sent right behind its response are yielded before
/// anything else read from the underlying stream.
#[derive(Debug)]
pub struct Tunnel<S> {
    inner: S,
    prefix: Bytes,
    event: ProxyConnectionEvent,
}

impl<S> Tunnel<S> {
    pub fn new(inner: S, prefix: Bytes, event: ProxyConnectionEvent) -> Self {
        Self {
            inner,
            prefix,
            event,
        }
    }

    /// Details of the established tunnel.
    pub fn event(&self) -> &ProxyConnectionEvent {
        &self.event
    }

    /// Tunnel bytes received but not yet read.
    pub fn buffered(&self) -> &[u8] {
        &self.prefix
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// The stream and any still unread tunnel bytes.
    pub fn into_parts(self) -> (S, Bytes) {
        (self.inner, self.prefix)
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Tunnel<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            buf.put_slice(&self.prefix[..n]);
            self.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Tunnel<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::context::{DestinationTarget, ProxyEndpoint};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn event() -> ProxyConnectionEvent {
        ProxyConnectionEvent {
            protocol: "http".into(),
            auth_scheme: "none".into(),
            proxy: ProxyEndpoint::inet("proxy", 3128),
            destination: DestinationTarget::unresolved("example.com", 22),
        }
    }

    #[tokio::test]
    async fn prefix_is_read_before_stream() {
        let (a, mut b) = duplex(64);
        let mut tunnel = Tunnel::new(a, Bytes::from_static(b"early "), event());
        b.write_all(b"later").await.unwrap();
        drop(b);

        let mut small = [0u8; 3];
        tunnel.read_exact(&mut small).await.unwrap();
        assert_eq!(&small, b"ear");
        assert_eq!(tunnel.buffered(), b"ly ");

        let mut rest = String::new();
        tunnel.read_to_string(&mut rest).await.unwrap();
        assert_eq!(rest, "ly later");
    }

    #[tokio::test]
    async fn writes_pass_through() {
        let (a, mut b) = duplex(64);
        let mut tunnel = Tunnel::new(a, Bytes::new(), event());
        tunnel.write_all(b"ping").await.unwrap();
        tunnel.flush().await.unwrap();

        let mut got = [0u8; 4];
        b.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"ping");

        let (_inner, rest) = tunnel.into_parts();
        assert!(rest.is_empty());
    }
}
