//! HTTP CONNECT protocol strategy.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue, HOST, PROXY_AUTHORIZATION};
use http::{HeaderMap, Method, StatusCode, Version};

use crate::handshake::context::HandshakeContext;
use crate::handshake::error::HandshakeError;
use crate::handshake::protocol::{HandshakeProtocol, AUTH_NONE};
use crate::http::auth::{encode_basic_auth, AUTH_BASIC};
use crate::http::codec::HttpClientCodec;
use crate::http::request::RequestHead;
use crate::http::response::HttpObject;

/// Scheme the tunnel is advertised under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
}

impl ProxyScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(ProxyScheme::Http),
            "https" => Ok(ProxyScheme::Https),
            other => Err(HandshakeError::InvalidConfiguration(format!(
                "protocol should be http or https, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
}

/// Immutable per-proxy settings, shared by every attempt through `Arc`.
///
/// The `Proxy-Authorization` value is derived once here and never
/// recomputed.
#[derive(Clone, Default)]
pub struct HttpConnectSettings {
    scheme: ProxyScheme,
    credentials: Option<Credentials>,
    authorization: Option<HeaderValue>,
    extra_headers: HeaderMap,
}

impl HttpConnectSettings {
    /// Plain `http`, no authentication.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheme(scheme: &str) -> Result<Self, HandshakeError> {
        Ok(Self {
            scheme: scheme.parse()?,
            ..Self::default()
        })
    }

    pub fn with_credentials(
        username: &str,
        password: &str,
        scheme: &str,
    ) -> Result<Self, HandshakeError> {
        let mut settings = Self::with_scheme(scheme)?;
        let mut token = HeaderValue::from_str(&encode_basic_auth(username, password))
            .map_err(|e| HandshakeError::InvalidConfiguration(e.to_string()))?;
        token.set_sensitive(true);
        settings.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        settings.authorization = Some(token);
        Ok(settings)
    }

    /// Build from optional parts; username and password come as a pair.
    pub fn from_parts(
        scheme: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, HandshakeError> {
        match (username, password) {
            (Some(user), Some(pass)) => Self::with_credentials(user, pass, scheme),
            (None, None) => Self::with_scheme(scheme),
            (Some(_), None) => Err(HandshakeError::MissingCredential("password")),
            (None, Some(_)) => Err(HandshakeError::MissingCredential("username")),
        }
    }

    /// Add a header sent with every CONNECT request.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, HandshakeError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HandshakeError::InvalidConfiguration(format!("invalid header name {name:?}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| HandshakeError::InvalidConfiguration(format!("invalid value for header {name}")))?;
        self.extra_headers.append(name, value);
        Ok(self)
    }

    pub fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.username.as_str())
    }

    pub fn password(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.password.as_str())
    }

    /// The precomputed `Basic …` value, if credentials were given.
    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }

    pub fn auth_scheme(&self) -> &'static str {
        if self.authorization.is_some() {
            AUTH_BASIC
        } else {
            AUTH_NONE
        }
    }
}

impl fmt::Debug for HttpConnectSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnectSettings")
            .field("scheme", &self.scheme)
            .field("username", &self.username())
            .field("auth_scheme", &self.auth_scheme())
            .field("extra_headers", &self.extra_headers.len())
            .finish()
    }
}

/// Strategy for one CONNECT attempt.
#[derive(Debug)]
pub struct HttpConnectProtocol {
    settings: Arc<HttpConnectSettings>,
    /// `(code, status line)` of the one response seen so far.
    status: Option<(StatusCode, String)>,
}

impl HttpConnectProtocol {
    pub fn new(settings: Arc<HttpConnectSettings>) -> Self {
        Self {
            settings,
            status: None,
        }
    }

    pub fn settings(&self) -> &HttpConnectSettings {
        &self.settings
    }
}

impl HandshakeProtocol for HttpConnectProtocol {
    type Codec = HttpClientCodec;

    fn protocol(&self) -> &str {
        self.settings.scheme.as_str()
    }

    fn auth_scheme(&self) -> &str {
        self.settings.auth_scheme()
    }

    fn new_codec(&self) -> HttpClientCodec {
        HttpClientCodec::new()
    }

    fn new_initial_message(&self, ctx: &HandshakeContext) -> Result<RequestHead, HandshakeError> {
        let mut req = RequestHead::new(
            Method::CONNECT,
            ctx.destination().authority(),
            Version::HTTP_10,
        );
        req.headers = self.settings.extra_headers.clone();

        if let Some(host) = ctx.proxy().host_header() {
            let value = HeaderValue::from_str(&host).map_err(|_| {
                HandshakeError::InvalidConfiguration(format!("proxy host {host:?} is not a valid header value"))
            })?;
            req.headers.insert(HOST, value);
        }
        if let Some(token) = &self.settings.authorization {
            req.headers.insert(PROXY_AUTHORIZATION, token.clone());
        }
        Ok(req)
    }

    fn handle_response(
        &mut self,
        ctx: &HandshakeContext,
        response: HttpObject,
    ) -> Result<bool, HandshakeError> {
        match response {
            HttpObject::Head(head) => {
                if self.status.is_some() {
                    return Err(ctx.violation("too many responses"));
                }
                tracing::debug!(status = %head.status_line(), "Proxy responded to CONNECT");
                self.status = Some((head.status, head.status_line()));
                Ok(false)
            }
            // Body bytes are not part of the handshake.
            HttpObject::Content(_) => Ok(false),
            HttpObject::LastContent(_) => match &self.status {
                None => Err(ctx.violation("missing response")),
                Some((code, line)) if *code != StatusCode::OK => {
                    Err(ctx.violation(format!("status: {line}")))
                }
                Some(_) => Ok(true),
            },
        }
    }
}
