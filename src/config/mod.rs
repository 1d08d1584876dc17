//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → TunnelConfig (validated, immutable)
//!     → CLI flags override individual fields
//!     → ProxyConnector::from_config
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Timeouts are milliseconds; `0` disables the handshake deadline

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ObservabilityConfig, ProxySection, TimeoutConfig, TunnelConfig};
pub use validation::{validate_config, ValidationError};
