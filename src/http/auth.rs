//! Basic proxy credentials.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

pub const AUTH_BASIC: &str = "basic";

/// `Basic <base64(user:pass)>`, standard alphabet with padding, UTF-8 input.
pub fn encode_basic_auth(username: &str, password: &str) -> String {
    let raw = format!("{username}:{password}");
    format!("Basic {}", STANDARD.encode(raw.as_bytes()))
}
