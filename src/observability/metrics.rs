//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_handshakes_total` (counter): completed handshakes by protocol, result
//! - `proxy_handshake_duration_seconds` (histogram): connect-to-resolution latency
//!
//! # Design Decisions
//! - `result` is `success` or the error kind label (`timeout`, `protocol_violation`, …)
//! - Without an installed recorder the macros do nothing

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const HANDSHAKES_TOTAL: &str = "proxy_handshakes_total";
pub const HANDSHAKE_DURATION: &str = "proxy_handshake_duration_seconds";

/// Record one resolved handshake.
pub fn record_handshake(protocol: &str, result: &'static str, duration: Duration) {
    counter!(
        HANDSHAKES_TOTAL,
        "protocol" => protocol.to_string(),
        "result" => result
    )
    .increment(1);
    histogram!(HANDSHAKE_DURATION, "protocol" => protocol.to_string())
        .record(duration.as_secs_f64());
}

/// Start the Prometheus scrape endpoint on `addr`. Must run inside a tokio
/// runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_handshake("http", "success", Duration::from_millis(12));
        record_handshake("http", "timeout", Duration::from_secs(10));
    }
}
