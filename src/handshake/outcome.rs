//! Single-fire handshake outcome.
//!
//! The notifier does not guard against misuse itself; the state machine only
//! fires it from a terminal transition, which happens at most once.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::handshake::error::HandshakeError;

pub type HandshakeOutcome = Result<(), HandshakeError>;

/// Sending half, owned by the state machine.
#[derive(Debug)]
pub struct OutcomeNotifier {
    tx: Option<oneshot::Sender<HandshakeOutcome>>,
}

impl OutcomeNotifier {
    /// Create the notifier and the future its single consumer awaits.
    ///
    /// `context` is used to describe the failure if the notifier is dropped
    /// without ever firing.
    pub fn new(context: String) -> (Self, ConnectFuture) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, ConnectFuture { rx, context })
    }

    /// Deliver the outcome. Returns false if it had already been delivered.
    pub fn fire(&mut self, outcome: HandshakeOutcome) -> bool {
        match self.tx.take() {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.tx.is_none()
    }
}

/// Resolves once the handshake succeeds or fails.
#[derive(Debug)]
pub struct ConnectFuture {
    rx: oneshot::Receiver<HandshakeOutcome>,
    context: String,
}

impl ConnectFuture {
    /// Non-blocking check for a delivered outcome.
    pub fn try_outcome(&mut self) -> Option<HandshakeOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(self.abandoned())),
        }
    }

    fn abandoned(&self) -> HandshakeError {
        HandshakeError::ConnectionClosedEarly {
            context: self.context.clone(),
        }
    }
}

impl Future for ConnectFuture {
    type Output = HandshakeOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(self.abandoned())),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_exactly_once() {
        let (mut notifier, mut future) = OutcomeNotifier::new("ctx".into());
        assert!(future.try_outcome().is_none());

        assert!(notifier.fire(Ok(())));
        assert!(!notifier.fire(Err(HandshakeError::ConnectionClosedEarly {
            context: "ctx".into()
        })));
        assert!(notifier.has_fired());
        assert_eq!(future.try_outcome(), Some(Ok(())));
    }

    #[tokio::test]
    async fn dropped_notifier_reads_as_closed() {
        let (notifier, future) = OutcomeNotifier::new("http, none, p:1 => d:2".into());
        drop(notifier);
        let err = future.await.unwrap_err();
        assert_eq!(err.to_string(), "http, none, p:1 => d:2, disconnected");
    }
}
