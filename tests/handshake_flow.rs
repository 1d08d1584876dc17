//! End-to-end handshake tests against a scripted proxy.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use proxy_tunnel::config::TunnelConfig;
use proxy_tunnel::handshake::{DestinationTarget, HandshakeError, ProxyEndpoint};
use proxy_tunnel::http::HttpConnectSettings;
use proxy_tunnel::lifecycle::Shutdown;
use proxy_tunnel::net::ProxyConnector;

mod common;

use common::{start_mock_proxy, Script};

const ESTABLISHED: &str = "HTTP/1.1 200 Connection established\r\n\r\n";

fn destination() -> DestinationTarget {
    DestinationTarget::unresolved("example.com", 443)
}

#[tokio::test]
async fn test_tunnel_carries_bytes_both_ways() {
    let (addr, mut requests) = start_mock_proxy(Script::AcceptAndEcho(ESTABLISHED)).await;
    let settings = HttpConnectSettings::with_credentials("alice", "s3cret", "http").unwrap();
    let connector = ProxyConnector::new(ProxyEndpoint::from(addr), settings);

    let mut tunnel = connector.connect(destination()).await.unwrap();
    assert_eq!(tunnel.event().auth_scheme, "basic");

    let request = requests.recv().await.unwrap();
    assert!(request.starts_with("CONNECT example.com:443 HTTP/1.0\r\n"));
    assert!(request.contains(&format!("Host: {}\r\n", addr)));
    assert!(request.contains("Proxy-Authorization: Basic YWxpY2U6czNjcmV0\r\n"));

    tunnel.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    tunnel.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");
}

#[tokio::test]
async fn test_bytes_after_response_reach_the_application() {
    let (addr, _requests) = start_mock_proxy(Script::Respond(
        "HTTP/1.0 200 OK\r\nVia: 1.0 mock\r\n\r\nSSH-2.0-mock\r\n",
    ))
    .await;
    let connector = ProxyConnector::new(ProxyEndpoint::from(addr), HttpConnectSettings::new());

    let mut tunnel = connector.connect(destination()).await.unwrap();
    let mut banner = [0u8; 14];
    tunnel.read_exact(&mut banner).await.unwrap();
    assert_eq!(&banner, b"SSH-2.0-mock\r\n");
}

#[tokio::test]
async fn test_early_data_follows_the_connect_request() {
    let (addr, _requests) = start_mock_proxy(Script::AcceptAndEcho(ESTABLISHED)).await;
    let connector = ProxyConnector::new(ProxyEndpoint::from(addr), HttpConnectSettings::new());

    let mut tunnel = connector
        .connect_with(destination(), Some(Bytes::from_static(b"hello")), None)
        .await
        .unwrap();
    let mut echoed = [0u8; 5];
    tunnel.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello");
}

#[tokio::test]
async fn test_proxy_auth_required_fails() {
    let (addr, _requests) = start_mock_proxy(Script::Respond(
        "HTTP/1.1 407 Proxy Authentication Required\r\n\
         Proxy-Authenticate: Basic realm=\"mock\"\r\n\
         Content-Length: 0\r\n\r\n",
    ))
    .await;
    let connector = ProxyConnector::new(ProxyEndpoint::from(addr), HttpConnectSettings::new());

    let err = connector.connect(destination()).await.unwrap_err();
    assert!(matches!(err, HandshakeError::ProtocolViolation { .. }));
    assert_eq!(
        err.to_string(),
        format!("http, none, {addr} => example.com:443, status: 407 Proxy Authentication Required")
    );
}

#[tokio::test]
async fn test_silent_proxy_times_out() {
    let (addr, _requests) = start_mock_proxy(Script::Silent).await;
    let connector = ProxyConnector::new(ProxyEndpoint::from(addr), HttpConnectSettings::new())
        .with_handshake_timeout(Duration::from_millis(200));

    let started = std::time::Instant::now();
    let err = connector.connect(destination()).await.unwrap_err();
    assert!(matches!(err, HandshakeError::HandshakeTimeout { .. }));
    assert!(err.to_string().ends_with("timeout after 200ms"));
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_hangup_is_closed_early() {
    let (addr, _requests) = start_mock_proxy(Script::Hangup).await;
    let connector = ProxyConnector::new(ProxyEndpoint::from(addr), HttpConnectSettings::new());

    let err = connector.connect(destination()).await.unwrap_err();
    assert!(matches!(err, HandshakeError::ConnectionClosedEarly { .. }));
    assert!(err.to_string().ends_with("disconnected"));
}

#[tokio::test]
async fn test_shutdown_cancels_pending_handshake() {
    let (addr, _requests) = start_mock_proxy(Script::Silent).await;
    let connector = ProxyConnector::new(ProxyEndpoint::from(addr), HttpConnectSettings::new())
        .with_handshake_timeout(Duration::ZERO);
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
    });

    let err = connector
        .connect_with(destination(), None, Some(rx))
        .await
        .unwrap_err();
    assert!(matches!(err, HandshakeError::ConnectionClosedEarly { .. }));
}

#[tokio::test]
async fn test_refused_proxy_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector = ProxyConnector::new(ProxyEndpoint::from(addr), HttpConnectSettings::new());
    let err = connector.connect(destination()).await.unwrap_err();
    assert_eq!(err.kind(), "transport");
    assert!(err.to_string().starts_with(&format!("http, none, {addr} => example.com:443, ")));
}

#[tokio::test]
async fn test_connector_from_config() {
    let (addr, mut requests) = start_mock_proxy(Script::AcceptAndEcho(ESTABLISHED)).await;
    let mut config = TunnelConfig::default();
    config.proxy.address = addr.to_string();
    config.proxy.scheme = "https".into();
    config.proxy.headers.insert("User-Agent".into(), "proxy-connect-test".into());

    let connector = ProxyConnector::from_config(&config).unwrap();
    let tunnel = connector
        .connect(DestinationTarget::parse("192.0.2.10:8443").unwrap())
        .await
        .unwrap();
    assert_eq!(tunnel.event().protocol, "https");

    let request = requests.recv().await.unwrap();
    assert!(request.starts_with("CONNECT 192.0.2.10:8443 HTTP/1.0\r\n"));
    assert!(request.contains("User-Agent: proxy-connect-test\r\n"));
}
