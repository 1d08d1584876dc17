//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the proxy address, scheme and credential pairing
//! - Validate header names and values
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TunnelConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use http::header::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::schema::TunnelConfig;
use crate::handshake::context::ProxyEndpoint;
use crate::http::connect::ProxyScheme;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("proxy.address {0:?} is not host:port")]
    InvalidProxyAddress(String),

    #[error("proxy.scheme must be http or https, got {0:?}")]
    InvalidScheme(String),

    #[error("proxy.{0} is set but proxy.{1} is missing")]
    UnpairedCredential(&'static str, &'static str),

    #[error("proxy.headers: invalid header {0:?}")]
    InvalidHeader(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &TunnelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let proxy = &config.proxy;

    if ProxyEndpoint::parse(&proxy.address).is_err() {
        errors.push(ValidationError::InvalidProxyAddress(proxy.address.clone()));
    }
    if proxy.scheme.parse::<ProxyScheme>().is_err() {
        errors.push(ValidationError::InvalidScheme(proxy.scheme.clone()));
    }
    match (&proxy.username, &proxy.password) {
        (Some(_), None) => errors.push(ValidationError::UnpairedCredential("username", "password")),
        (None, Some(_)) => errors.push(ValidationError::UnpairedCredential("password", "username")),
        _ => {}
    }
    for (name, value) in &proxy.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::InvalidHeader(name.clone()));
        }
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(obs.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
