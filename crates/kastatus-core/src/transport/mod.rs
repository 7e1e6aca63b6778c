//! Transport adapter: one request/reply RPC exchange over a channel.
//!
//! The [`Transport`] trait is the seam between the status client and the
//! wire. It performs exactly one attempt per call; retry policy lives in
//! the client. [`XmlRpcTransport`] is the production implementation.

pub mod xmlrpc_http;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use kastatus_config::EndpointConfig;

use crate::BoxFuture;
use crate::value::RpcValue;

pub use xmlrpc_http::XmlRpcTransport;

/// Path the daemons serve XML-RPC on.
pub const DEFAULT_RPC_PATH: &str = "/RPC2";

/// Errors from a single transport operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {endpoint} refused")]
    ConnectionRefused { endpoint: String },

    #[error("connecting to {endpoint} timed out after {timeout:?}")]
    ConnectionTimeout { endpoint: String, timeout: Duration },

    #[error("invalid daemon address: {0}")]
    AddressInvalid(String),

    #[error("call timed out after {0:?}")]
    CallTimeout(Duration),

    #[error("channel failure: {0}")]
    Transport(String),

    #[error("daemon fault {code}: {message}")]
    RemoteFault { code: i64, message: String },

    #[error("not connected")]
    NotConnected,

    #[error("daemon answered HTTP {status}")]
    Http { status: u16 },

    #[error("invalid XML-RPC response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Whether a fresh connect-and-call might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::ConnectionRefused { .. }
            | TransportError::ConnectionTimeout { .. }
            | TransportError::AddressInvalid(_)
            | TransportError::CallTimeout(_)
            | TransportError::Transport(_)
            | TransportError::NotConnected => true,
            TransportError::Http { status } => (500..600).contains(status),
            TransportError::RemoteFault { .. } | TransportError::InvalidResponse(_) => false,
        }
    }
}

/// Network location of a daemon's RPC service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: DEFAULT_RPC_PATH.to_string(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// `host:port`, as used for the socket address and `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    /// Accepts `host:port`, `host:port/path` or `http://host:port/path`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| TransportError::AddressInvalid(format!("{s:?}: {why}"));

        let rest = s.trim();
        let rest = rest.strip_prefix("http://").unwrap_or(rest);
        if rest.contains("://") {
            return Err(invalid("only http is supported"));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, DEFAULT_RPC_PATH),
        };
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected host:port"))?;
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("bad port"))?;
        if port == 0 {
            return Err(invalid("port must be non-zero"));
        }

        Ok(Endpoint::new(host, port).with_path(path))
    }
}

impl From<&EndpointConfig> for Endpoint {
    fn from(config: &EndpointConfig) -> Self {
        Endpoint::new(config.host.clone(), config.port).with_path(config.path.clone())
    }
}

/// A request/reply RPC channel to one daemon.
///
/// Uses `BoxFuture` so clients can hold a `Box<dyn Transport>`.
pub trait Transport: Send {
    /// Open the channel. Any previously open channel is released first.
    fn connect<'a>(
        &'a mut self,
        endpoint: &'a Endpoint,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Issue one call and wait up to `timeout` for its reply.
    fn call<'a>(
        &'a mut self,
        method: &'a str,
        params: &'a [RpcValue],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<RpcValue, TransportError>>;

    /// Release the channel. Idempotent.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let ep: Endpoint = "kadrx.local:8081".parse().unwrap();
        assert_eq!(ep, Endpoint::new("kadrx.local", 8081));
        assert_eq!(ep.url(), "http://kadrx.local:8081/RPC2");

        let ep: Endpoint = "http://10.0.0.5:8080/xmlrpc".parse().unwrap();
        assert_eq!(ep.host, "10.0.0.5");
        assert_eq!(ep.port, 8080);
        assert_eq!(ep.path, "/xmlrpc");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["kadrx", ":8081", "host:port", "host:0", "https://host:1/RPC2"] {
            let err = bad.parse::<Endpoint>().unwrap_err();
            assert!(matches!(err, TransportError::AddressInvalid(_)), "{bad}");
        }
    }

    #[test]
    fn test_from_config() {
        let config = kastatus_config::AppConfig::default().xmitd;
        let ep = Endpoint::from(&config);
        assert_eq!(ep, Endpoint::new("localhost", 8080));
        assert_eq!(ep.url(), "http://localhost:8080/RPC2");
    }

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::CallTimeout(Duration::from_secs(1)).is_transient());
        assert!(TransportError::Http { status: 503 }.is_transient());
        assert!(!TransportError::Http { status: 404 }.is_transient());
        assert!(
            !TransportError::RemoteFault {
                code: 1,
                message: "no".into()
            }
            .is_transient()
        );
        assert!(!TransportError::InvalidResponse("junk".into()).is_transient());
    }
}
