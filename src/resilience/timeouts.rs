//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the TCP connect to the proxy
//! - Keep timeout errors distinct from other I/O errors

use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};

/// Default bound on the TCP connect to the proxy.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("connect failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectError::Timeout(_))
    }
}

/// Dial `addr`, giving up after `timeout`. `None` waits as long as the OS does.
pub async fn connect_with_timeout<A: ToSocketAddrs>(
    addr: A,
    timeout: Option<Duration>,
) -> Result<TcpStream, ConnectError> {
    let connect = TcpStream::connect(addr);
    let stream = match timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| ConnectError::Timeout(limit))??,
        None => connect.await?,
    };
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_within_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = connect_with_timeout(addr, Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn refused_connection_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = connect_with_timeout(addr, None).await.unwrap_err();
        assert!(!err.is_timeout());
    }

    #[test]
    fn timeout_message() {
        let err = ConnectError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "connect timed out after 250ms");
    }
}
