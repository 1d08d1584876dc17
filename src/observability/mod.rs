//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handshake state machine and driver produce:
//!     → logging.rs (structured events on stderr)
//!     → metrics.rs (handshake counters and latency histogram)
//!
//! Consumers:
//!     → Terminal / log collector (stderr keeps stdout free for the tunnel)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Attempt ID, proxy and destination are attached to every handshake event
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
