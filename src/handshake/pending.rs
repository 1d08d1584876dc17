//! Writes held back until the tunnel is confirmed.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::handshake::error::HandshakeError;

/// Receiving side of a [`WritePromise`].
pub type WriteCompletion = oneshot::Receiver<Result<(), HandshakeError>>;

/// Completion callback attached to an outbound write.
///
/// Completing is idempotent: the first `succeed`/`fail` wins and later calls
/// are ignored. A promise created with [`WritePromise::none`] has no observer.
#[derive(Debug, Default)]
pub struct WritePromise {
    tx: Option<oneshot::Sender<Result<(), HandshakeError>>>,
}

impl WritePromise {
    pub fn new() -> (Self, WriteCompletion) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn succeed(&mut self) {
        self.complete(Ok(()));
    }

    pub fn fail(&mut self, err: HandshakeError) {
        self.complete(Err(err));
    }

    pub fn is_done(&self) -> bool {
        self.tx.is_none()
    }

    fn complete(&mut self, result: Result<(), HandshakeError>) {
        if let Some(tx) = self.tx.take() {
            // Receiver may be gone; the writer stopped caring.
            let _ = tx.send(result);
        }
    }
}

/// One queued write.
#[derive(Debug)]
pub struct PendingWrite {
    pub data: Bytes,
    pub promise: WritePromise,
}

/// FIFO of writes submitted before the handshake resolved.
#[derive(Debug, Default)]
pub struct PendingWrites {
    queue: VecDeque<PendingWrite>,
    bytes: usize,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: Bytes, promise: WritePromise) {
        self.bytes += data.len();
        self.queue.push_back(PendingWrite { data, promise });
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total queued payload size.
    pub fn queued_bytes(&self) -> usize {
        self.bytes
    }

    /// Hand every queued write to `sink` in submission order.
    pub fn drain_into(&mut self, mut sink: impl FnMut(PendingWrite)) {
        self.bytes = 0;
        while let Some(write) = self.queue.pop_front() {
            sink(write);
        }
    }

    /// Discard every queued write, failing its promise with `err`.
    pub fn fail_all(&mut self, err: &HandshakeError) {
        self.bytes = 0;
        for mut write in self.queue.drain(..) {
            write.promise.fail(err.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed() -> HandshakeError {
        HandshakeError::ConnectionClosedEarly {
            context: "test".into(),
        }
    }

    #[test]
    fn drains_in_submission_order() {
        let mut pending = PendingWrites::new();
        pending.push(Bytes::from_static(b"one"), WritePromise::none());
        pending.push(Bytes::from_static(b"two"), WritePromise::none());
        pending.push(Bytes::from_static(b"three"), WritePromise::none());
        assert_eq!(pending.queued_bytes(), 11);

        let mut seen = Vec::new();
        pending.drain_into(|w| seen.push(w.data));
        assert_eq!(seen, vec!["one", "two", "three"]);
        assert!(pending.is_empty());
        assert_eq!(pending.queued_bytes(), 0);
    }

    #[test]
    fn fail_all_reaches_every_promise() {
        let mut pending = PendingWrites::new();
        let (p1, mut c1) = WritePromise::new();
        let (p2, mut c2) = WritePromise::new();
        pending.push(Bytes::from_static(b"a"), p1);
        pending.push(Bytes::from_static(b"b"), p2);

        pending.fail_all(&closed());

        assert_eq!(c1.try_recv().unwrap(), Err(closed()));
        assert_eq!(c2.try_recv().unwrap(), Err(closed()));
        assert!(pending.is_empty());
    }

    #[test]
    fn promise_completes_once() {
        let (mut promise, mut completion) = WritePromise::new();
        promise.succeed();
        promise.fail(closed());
        assert!(promise.is_done());
        assert_eq!(completion.try_recv().unwrap(), Ok(()));
    }
}
