//! Proxy handshake state machine.
//!
//! # Responsibilities
//! - Install the protocol codec and send the initial message on connect
//! - Route inbound messages to the protocol until it reports completion
//! - Hold application writes until the tunnel is confirmed
//! - Enforce the handshake deadline
//! - Deliver the outcome exactly once
//!
//! # Design Decisions
//! - Sans-IO: the owner feeds events in and drives the timer from
//!   [`ProxyHandshake::poll_timeout`]; nothing here blocks or spawns
//! - Every terminal transition goes through `succeed` or `fail`, and both
//!   return early once the state is terminal
//! - A fresh attempt needs a fresh `ProxyHandshake`

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::handshake::context::{
    DestinationTarget, HandshakeContext, ProxyConnectionEvent, ProxyEndpoint,
};
use crate::handshake::error::HandshakeError;
use crate::handshake::outcome::{ConnectFuture, OutcomeNotifier};
use crate::handshake::pending::{PendingWrites, WritePromise};
use crate::handshake::protocol::{HandshakeCodec, HandshakeProtocol};
use crate::handshake::state::HandshakeState;
use crate::net::connection::{AttemptId, Connection};
use crate::observability::metrics;

/// Default time allowed between connect and a terminal response.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(10_000);

type Response<P> = <<P as HandshakeProtocol>::Codec as HandshakeCodec>::Response;

pub struct ProxyHandshake<P: HandshakeProtocol> {
    id: AttemptId,
    protocol: P,
    ctx: HandshakeContext,
    state: HandshakeState,
    pending: PendingWrites,
    notifier: OutcomeNotifier,
    connect_future: Option<ConnectFuture>,
    failure: Option<HandshakeError>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    started: Option<Instant>,
    /// Inbound bytes not yet consumed by the protocol decoder.
    read_buf: BytesMut,
    codec_installed: bool,
    flushed_prematurely: bool,
}

impl<P: HandshakeProtocol> ProxyHandshake<P> {
    pub fn new(protocol: P, proxy: ProxyEndpoint, destination: DestinationTarget) -> Self {
        let ctx = HandshakeContext::new(
            protocol.protocol(),
            protocol.auth_scheme(),
            proxy,
            destination,
        );
        let (notifier, connect_future) = OutcomeNotifier::new(ctx.describe());
        Self {
            id: AttemptId::new(),
            protocol,
            ctx,
            state: HandshakeState::Connecting,
            pending: PendingWrites::new(),
            notifier,
            connect_future: Some(connect_future),
            failure: None,
            timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            deadline: None,
            started: None,
            read_buf: BytesMut::new(),
            codec_installed: false,
            flushed_prematurely: false,
        }
    }

    /// Set the handshake timeout. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.set_timeout(timeout);
        self
    }

    /// Takes effect for the next `on_connected`; an armed deadline is kept.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Future for the outcome. Only the first caller gets it.
    pub fn connect_future(&mut self) -> Option<ConnectFuture> {
        self.connect_future.take()
    }

    pub fn id(&self) -> AttemptId {
        self.id
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == HandshakeState::Succeeded
    }

    pub fn context(&self) -> &HandshakeContext {
        &self.ctx
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Number of writes waiting for the handshake to resolve.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Instant at which [`on_timeout`](Self::on_timeout) should be called,
    /// if a deadline is armed.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.deadline
    }

    /// The transport to the proxy is up: install the codec, send the initial
    /// message and arm the deadline.
    pub fn on_connected(&mut self, conn: &mut dyn Connection) {
        if self.state != HandshakeState::Connecting {
            tracing::debug!(
                attempt = %self.id,
                state = %self.state,
                "Ignoring connect notification outside the connecting state"
            );
            return;
        }

        self.transition(HandshakeState::AwaitingResponse);
        let now = Instant::now();
        self.started = Some(now);
        self.deadline = self.timeout.map(|t| now + t);

        tracing::debug!(
            attempt = %self.id,
            protocol = self.ctx.protocol(),
            auth = self.ctx.auth_scheme(),
            proxy = %self.ctx.proxy(),
            destination = %self.ctx.destination(),
            "Starting proxy handshake"
        );

        if let Err(err) = self.send_initial_message(conn) {
            self.fail(conn, err);
            return;
        }
        // Bytes that arrived before the connect notification.
        if !self.read_buf.is_empty() {
            self.decode_buffered(conn, false);
        }
    }

    fn send_initial_message(&mut self, conn: &mut dyn Connection) -> Result<(), HandshakeError> {
        self.protocol
            .install_codec(conn)
            .map_err(|e| self.ctx.transport(e))?;
        self.codec_installed = true;

        let message = self.protocol.new_initial_message(&self.ctx)?;
        let name = self.protocol.codec_name(conn.handler_name());
        let mut buf = BytesMut::new();
        let codec = conn
            .pipeline()
            .get_mut::<P::Codec>(&name)
            .map_err(|e| self.ctx.transport(e))?;
        codec
            .encode(message, &mut buf)
            .map_err(|e| self.ctx.transport(e))?;

        conn.write(buf.freeze(), WritePromise::none());
        conn.flush();
        Ok(())
    }

    /// Raw bytes from the transport.
    ///
    /// While the handshake runs they are decoded by the installed codec.
    /// Once it has succeeded they belong to the tunnel and go straight up.
    pub fn on_inbound_bytes(&mut self, conn: &mut dyn Connection, data: Bytes) {
        match self.state {
            HandshakeState::Succeeded => {
                conn.fire_read(data);
                return;
            }
            HandshakeState::Failed => {
                tracing::trace!(attempt = %self.id, len = data.len(), "Discarding bytes after failure");
                return;
            }
            _ => {}
        }

        self.read_buf.extend_from_slice(&data);
        if self.state == HandshakeState::AwaitingResponse {
            self.decode_buffered(conn, false);
        }
    }

    fn decode_buffered(&mut self, conn: &mut dyn Connection, eof: bool) {
        let name = self.protocol.codec_name(conn.handler_name());
        while self.state == HandshakeState::AwaitingResponse {
            let decoded = match conn.pipeline().get_mut::<P::Codec>(&name) {
                Ok(codec) if codec.has_decoder() => {
                    let result = if eof {
                        codec.decode_eof(&mut self.read_buf)
                    } else {
                        codec.decode(&mut self.read_buf)
                    };
                    result.map_err(|e| self.ctx.transport(e))
                }
                _ => Err(self.ctx.transport("protocol decoder is not installed")),
            };

            match decoded {
                Ok(Some(message)) => self.on_inbound_message(conn, message),
                Ok(None) => break,
                Err(err) => {
                    self.fail(conn, err);
                    break;
                }
            }
        }
    }

    /// One decoded response message. Ignored outside `AwaitingResponse`.
    pub fn on_inbound_message(&mut self, conn: &mut dyn Connection, message: Response<P>) {
        if self.state != HandshakeState::AwaitingResponse {
            tracing::debug!(
                attempt = %self.id,
                state = %self.state,
                "Ignoring handshake message outside the response phase"
            );
            return;
        }

        match self.protocol.handle_response(&self.ctx, message) {
            Ok(true) => self.succeed(conn),
            Ok(false) => {}
            Err(err) => self.fail(conn, err),
        }
    }

    /// Application write. Nothing reaches the wire before the tunnel is
    /// confirmed; after a failure the promise fails immediately.
    pub fn on_outbound_write(
        &mut self,
        conn: &mut dyn Connection,
        data: Bytes,
        mut promise: WritePromise,
    ) {
        match self.state {
            HandshakeState::Succeeded => conn.write(data, promise),
            HandshakeState::Failed => {
                let err = self
                    .failure
                    .clone()
                    .unwrap_or_else(|| self.ctx.closed_early());
                promise.fail(err);
            }
            HandshakeState::Connecting | HandshakeState::AwaitingResponse => {
                tracing::trace!(attempt = %self.id, len = data.len(), "Queueing write until handshake completes");
                self.pending.push(data, promise);
            }
        }
    }

    pub fn on_flush(&mut self, conn: &mut dyn Connection) {
        match self.state {
            HandshakeState::Succeeded => conn.flush(),
            HandshakeState::Failed => {}
            _ => self.flushed_prematurely = true,
        }
    }

    /// The handshake timer fired. No-op once resolved.
    pub fn on_timeout(&mut self, conn: &mut dyn Connection) {
        if self.state.is_terminal() {
            tracing::trace!(attempt = %self.id, "Handshake timer fired after resolution");
            return;
        }
        let err = self.ctx.timeout(self.timeout.unwrap_or_default());
        self.fail(conn, err);
    }

    /// The transport closed. Whatever the decoder can still produce from
    /// buffered bytes is processed first.
    pub fn on_connection_closed(&mut self, conn: &mut dyn Connection) {
        if self.state.is_terminal() {
            return;
        }
        if self.state == HandshakeState::AwaitingResponse {
            self.decode_buffered(conn, true);
            if self.state.is_terminal() {
                return;
            }
        }
        let err = self.ctx.closed_early();
        self.fail(conn, err);
    }

    /// Abort an in-flight handshake; handled exactly like a premature close.
    pub fn cancel(&mut self, conn: &mut dyn Connection) {
        if self.state.is_terminal() {
            return;
        }
        tracing::info!(attempt = %self.id, "Proxy handshake cancelled");
        self.on_connection_closed(conn);
    }

    pub fn on_transport_error(&mut self, conn: &mut dyn Connection, error: &dyn std::fmt::Display) {
        if self.state.is_terminal() {
            tracing::debug!(attempt = %self.id, error = %error, "Transport error after handshake resolved");
            return;
        }
        let err = self.ctx.transport(error);
        self.fail(conn, err);
    }

    fn succeed(&mut self, conn: &mut dyn Connection) {
        if self.state.is_terminal() {
            return;
        }
        if !self.remove_codec(conn) {
            let err = self.ctx.codec_removal();
            self.fail(conn, err);
            return;
        }

        self.transition(HandshakeState::Succeeded);
        self.deadline = None;
        conn.fire_tunnel_established(&ProxyConnectionEvent::from(&self.ctx));

        let queued = self.pending.len();
        self.pending.drain_into(|write| conn.write(write.data, write.promise));
        if self.flushed_prematurely {
            conn.flush();
        }
        if !self.read_buf.is_empty() {
            conn.fire_read(self.read_buf.split().freeze());
        }

        let elapsed = self.elapsed();
        tracing::info!(
            attempt = %self.id,
            proxy = %self.ctx.proxy(),
            destination = %self.ctx.destination(),
            released_writes = queued,
            elapsed_ms = elapsed.as_millis() as u64,
            "Proxy tunnel established"
        );
        metrics::record_handshake(self.ctx.protocol(), "success", elapsed);
        self.notifier.fire(Ok(()));
    }

    fn fail(&mut self, conn: &mut dyn Connection, err: HandshakeError) {
        if self.state.is_terminal() {
            return;
        }
        self.transition(HandshakeState::Failed);
        self.deadline = None;
        if !self.remove_codec(conn) {
            self.discard_codec_stage(conn);
        }
        self.read_buf.clear();

        let elapsed = self.elapsed();
        tracing::warn!(
            attempt = %self.id,
            kind = err.kind(),
            error = %err,
            discarded_writes = self.pending.len(),
            "Proxy handshake failed"
        );
        metrics::record_handshake(self.ctx.protocol(), err.kind(), elapsed);

        self.pending.fail_all(&err);
        self.failure = Some(err.clone());
        self.notifier.fire(Err(err));
        conn.close();
    }

    /// Remove the decoder, then the encoder. Returns false if either could not
    /// be removed; the stage then still counts as installed.
    fn remove_codec(&mut self, conn: &mut dyn Connection) -> bool {
        if !self.codec_installed {
            return true;
        }

        let mut removed = true;
        if let Err(e) = self.protocol.remove_decoder(conn) {
            tracing::warn!(attempt = %self.id, error = %e, "Failed to remove protocol decoder");
            removed = false;
        }
        // The stage is already gone if the encoder half was dropped earlier.
        let name = self.protocol.codec_name(conn.handler_name());
        if removed && !conn.pipeline().contains(&name) {
            self.codec_installed = false;
            return true;
        }
        if let Err(e) = self.protocol.remove_encoder(conn) {
            tracing::warn!(attempt = %self.id, error = %e, "Failed to remove protocol encoder");
            removed = false;
        }
        if removed {
            self.codec_installed = false;
        }
        removed
    }

    /// Drop whatever is left of the codec stage, halves or not.
    fn discard_codec_stage(&mut self, conn: &mut dyn Connection) {
        let name = self.protocol.codec_name(conn.handler_name());
        if conn.pipeline().remove(&name).is_ok() {
            tracing::debug!(attempt = %self.id, stage = %name, "Discarded protocol codec stage");
        }
        self.codec_installed = false;
    }

    fn transition(&mut self, next: HandshakeState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal handshake transition {} -> {}",
            self.state,
            next
        );
        tracing::trace!(attempt = %self.id, from = %self.state, to = %next, "Handshake state change");
        self.state = next;
    }

    fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }
}

impl<P: HandshakeProtocol> Drop for ProxyHandshake<P> {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let err = self.ctx.closed_early();
        self.state = HandshakeState::Failed;
        self.pending.fail_all(&err);
        self.notifier.fire(Err(err));
    }
}

impl<P: HandshakeProtocol> std::fmt::Debug for ProxyHandshake<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandshake")
            .field("id", &self.id)
            .field("context", &self.ctx.describe())
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("deadline", &self.deadline)
            .finish()
    }
}
