//! Tokio driver for the proxy handshake.
//!
//! # Responsibilities
//! - Dial the proxy with a connect deadline
//! - Feed socket reads, the handshake deadline and shutdown into the state machine
//! - Write whatever the state machine queued, once per event turn
//! - Hand back a [`Tunnel`] carrying bytes that arrived past the proxy response

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::config::schema::TunnelConfig;
use crate::handshake::context::{
    DestinationTarget, HandshakeContext, ProxyConnectionEvent, ProxyEndpoint,
};
use crate::handshake::error::HandshakeError;
use crate::handshake::machine::{ProxyHandshake, DEFAULT_HANDSHAKE_TIMEOUT};
use crate::handshake::pending::WritePromise;
use crate::handshake::protocol::HandshakeProtocol;
use crate::http::connect::{HttpConnectProtocol, HttpConnectSettings};
use crate::net::connection::Connection;
use crate::net::pipeline::Pipeline;
use crate::net::tunnel::Tunnel;
use crate::resilience::timeouts::{connect_with_timeout, DEFAULT_CONNECT_TIMEOUT};

/// Pipeline name of the handshake stage.
pub const HANDSHAKE_STAGE: &str = "proxy-handshake";

const READ_BUFFER_SIZE: usize = 4 * 1024;

/// Opens tunnels through one HTTP proxy.
///
/// Cheap to clone; every attempt gets its own protocol and state machine.
#[derive(Debug, Clone)]
pub struct ProxyConnector {
    proxy: ProxyEndpoint,
    settings: Arc<HttpConnectSettings>,
    connect_timeout: Option<Duration>,
    handshake_timeout: Duration,
}

impl ProxyConnector {
    pub fn new(proxy: ProxyEndpoint, settings: HttpConnectSettings) -> Self {
        Self {
            proxy,
            settings: Arc::new(settings),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Build from a validated configuration.
    pub fn from_config(config: &TunnelConfig) -> Result<Self, HandshakeError> {
        let proxy = ProxyEndpoint::parse(&config.proxy.address)?;
        let mut settings = HttpConnectSettings::from_parts(
            &config.proxy.scheme,
            config.proxy.username.as_deref(),
            config.proxy.password.as_deref(),
        )?;
        for (name, value) in &config.proxy.headers {
            settings = settings.header(name, value)?;
        }
        Ok(Self::new(proxy, settings)
            .with_connect_timeout(Duration::from_millis(config.timeouts.connect_ms))
            .with_handshake_timeout(Duration::from_millis(config.timeouts.handshake_ms)))
    }

    /// Zero waits as long as the OS does.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Zero disables the handshake deadline.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn proxy(&self) -> &ProxyEndpoint {
        &self.proxy
    }

    pub fn settings(&self) -> &HttpConnectSettings {
        &self.settings
    }

    /// Dial the proxy and open a tunnel to `destination`.
    pub async fn connect(
        &self,
        destination: DestinationTarget,
    ) -> Result<Tunnel<TcpStream>, HandshakeError> {
        self.connect_with(destination, None, None).await
    }

    /// Like [`connect`](Self::connect), with application bytes to send as
    /// soon as the tunnel is up and an optional shutdown signal.
    pub async fn connect_with(
        &self,
        destination: DestinationTarget,
        early_data: Option<Bytes>,
        mut shutdown: Option<broadcast::Receiver<()>>,
    ) -> Result<Tunnel<TcpStream>, HandshakeError> {
        let ctx = self.context(&destination);
        let (host, port) = match &self.proxy {
            ProxyEndpoint::Inet { host, port } => (host.as_str(), *port),
            ProxyEndpoint::Unix(_) => {
                return Err(HandshakeError::InvalidConfiguration(format!(
                    "{} is not a TCP endpoint; pass a connected stream to establish()",
                    self.proxy
                )))
            }
        };

        tracing::debug!(proxy = %self.proxy, destination = %destination, "Dialing proxy");
        let stream = tokio::select! {
            res = connect_with_timeout((host, port), self.connect_timeout) => {
                res.map_err(|e| ctx.transport(e))?
            }
            _ = cancelled(&mut shutdown) => return Err(ctx.closed_early()),
        };

        self.establish(stream, destination, early_data, shutdown).await
    }

    /// Run the handshake over an already connected stream.
    pub async fn establish<S>(
        &self,
        mut stream: S,
        destination: DestinationTarget,
        early_data: Option<Bytes>,
        mut shutdown: Option<broadcast::Receiver<()>>,
    ) -> Result<Tunnel<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let protocol = HttpConnectProtocol::new(Arc::clone(&self.settings));
        let mut handshake = ProxyHandshake::new(protocol, self.proxy.clone(), destination)
            .with_timeout(self.handshake_timeout);
        let Some(mut outcome) = handshake.connect_future() else {
            return Err(handshake.context().transport("handshake outcome unavailable"));
        };

        let mut conn = BufferedConnection::new();
        if let Some(data) = early_data {
            handshake.on_outbound_write(&mut conn, data, WritePromise::none());
            handshake.on_flush(&mut conn);
        }
        handshake.on_connected(&mut conn);

        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        loop {
            if let Err(e) = conn.write_to(&mut stream).await {
                let err = handshake.context().transport(&e);
                conn.fail_outbound(&err);
                if handshake.is_connected() {
                    // Released application writes never reached the tunnel.
                    tracing::warn!(attempt = %handshake.id(), error = %e, "Write failed after handshake");
                    return Err(err);
                }
                handshake.on_transport_error(&mut conn, &e);
            }
            if let Some(result) = outcome.try_outcome() {
                result?;
                break;
            }

            let deadline = handshake.poll_timeout();
            tokio::select! {
                read = stream.read_buf(&mut buf) => match read {
                    Ok(0) => handshake.on_connection_closed(&mut conn),
                    Ok(_) => handshake.on_inbound_bytes(&mut conn, buf.split().freeze()),
                    Err(e) => handshake.on_transport_error(&mut conn, &e),
                },
                _ = sleep_until(deadline) => handshake.on_timeout(&mut conn),
                _ = cancelled(&mut shutdown) => handshake.cancel(&mut conn),
            }
        }

        let Some(event) = conn.established.take() else {
            return Err(handshake.context().transport("tunnel established without notification"));
        };
        Ok(Tunnel::new(stream, conn.inbound.split().freeze(), event))
    }

    fn context(&self, destination: &DestinationTarget) -> HandshakeContext {
        let protocol = HttpConnectProtocol::new(Arc::clone(&self.settings));
        HandshakeContext::new(
            protocol.protocol(),
            protocol.auth_scheme(),
            self.proxy.clone(),
            destination.clone(),
        )
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

/// Resolves when shutdown is signalled. A dropped coordinator is not a signal.
async fn cancelled(shutdown: &mut Option<broadcast::Receiver<()>>) {
    if let Some(rx) = shutdown {
        match rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => {}
        }
    }
    std::future::pending::<()>().await
}

/// [`Connection`] that buffers in memory; the driver moves bytes between it
/// and the socket.
struct BufferedConnection {
    pipeline: Pipeline,
    outbound: VecDeque<(Bytes, WritePromise)>,
    inbound: BytesMut,
    established: Option<ProxyConnectionEvent>,
    closed: bool,
}

impl BufferedConnection {
    fn new() -> Self {
        let mut pipeline = Pipeline::new();
        // The handshake stage itself; the codec is installed in front of it.
        let _ = pipeline.add_last(HANDSHAKE_STAGE, ());
        Self {
            pipeline,
            outbound: VecDeque::new(),
            inbound: BytesMut::new(),
            established: None,
            closed: false,
        }
    }

    /// Write and flush everything queued, completing promises as it goes.
    async fn write_to<S: AsyncWrite + Unpin>(&mut self, stream: &mut S) -> std::io::Result<()> {
        if self.outbound.is_empty() {
            return Ok(());
        }
        if self.closed {
            // Unobserved promises read as dropped.
            self.outbound.clear();
            return Ok(());
        }
        while let Some((data, mut promise)) = self.outbound.pop_front() {
            if let Err(e) = stream.write_all(&data).await {
                self.outbound.push_front((data, promise));
                return Err(e);
            }
            promise.succeed();
        }
        stream.flush().await
    }

    /// Fail every write still queued.
    fn fail_outbound(&mut self, err: &HandshakeError) {
        for (_, mut promise) in self.outbound.drain(..) {
            promise.fail(err.clone());
        }
    }
}

impl Connection for BufferedConnection {
    fn handler_name(&self) -> &str {
        HANDSHAKE_STAGE
    }

    fn pipeline(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    fn write(&mut self, data: Bytes, promise: WritePromise) {
        self.outbound.push_back((data, promise));
    }

    // Every queued write is flushed at the end of the event turn.
    fn flush(&mut self) {}

    fn fire_read(&mut self, data: Bytes) {
        self.inbound.extend_from_slice(&data);
    }

    fn fire_tunnel_established(&mut self, event: &ProxyConnectionEvent) {
        self.established = Some(event.clone());
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
