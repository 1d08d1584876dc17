//! In-memory connection for unit tests.

use bytes::Bytes;

use crate::handshake::context::ProxyConnectionEvent;
use crate::handshake::pending::WritePromise;
use crate::net::connection::Connection;
use crate::net::pipeline::Pipeline;

/// Records everything the handshake does to it. Writes complete immediately.
pub(crate) struct RecordingConnection {
    pub pipeline: Pipeline,
    pub written: Vec<Bytes>,
    pub flushes: usize,
    pub reads: Vec<Bytes>,
    pub events: Vec<ProxyConnectionEvent>,
    pub closed: bool,
}

impl RecordingConnection {
    pub fn new() -> Self {
        let mut pipeline = Pipeline::new();
        pipeline.add_last("proxy", ()).unwrap();
        pipeline.add_last("app", ()).unwrap();
        Self {
            pipeline,
            written: Vec::new(),
            flushes: 0,
            reads: Vec::new(),
            events: Vec::new(),
            closed: false,
        }
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.written.iter().flat_map(|b| b.iter().copied()).collect()
    }
}

impl Connection for RecordingConnection {
    fn handler_name(&self) -> &str {
        "proxy"
    }

    fn pipeline(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    fn write(&mut self, data: Bytes, mut promise: WritePromise) {
        self.written.push(data);
        promise.succeed();
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }

    fn fire_read(&mut self, data: Bytes) {
        self.reads.push(data);
    }

    fn fire_tunnel_established(&mut self, event: &ProxyConnectionEvent) {
        self.events.push(event.clone());
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
