//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Honour `RUST_LOG` over the configured level
//!
//! # Design Decisions
//! - Events go to stderr; stdout may be carrying tunnel traffic

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `default_level` applies when `RUST_LOG`
/// is unset or invalid.
///
/// Returns false if a subscriber was already installed.
pub fn init_logging(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(default_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

/// Directive applied to this crate only; dependencies stay at `warn`.
fn default_filter(level: &str) -> String {
    format!("warn,proxy_tunnel={level},proxy_connect={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_scopes_level_to_crate() {
        let directive = default_filter("debug");
        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("proxy_tunnel=debug"));
        assert!(EnvFilter::try_new(directive).is_ok());
    }
}
