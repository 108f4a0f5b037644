//! Parses a `ws://`/`wss://` URL into the pieces the handshake and the
//! transport connector need (§4.6).

use crate::error::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketUrl {
    pub use_tls: bool,
    pub host: String,
    pub port: u16,
    pub path_and_query: String,
}

impl WebSocketUrl {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let parsed = Url::parse(raw)?;

        let (use_tls, default_port) = match parsed.scheme() {
            "ws" => (false, 80),
            "wss" => (true, 443),
            _ => return Err(Error::InvalidSchemeURL),
        };

        let host = parsed.host_str().ok_or(Error::URLNoHost)?.to_string();
        let port = parsed.port().unwrap_or(default_port);

        let path_and_query = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        };

        Ok(Self {
            use_tls,
            host,
            port,
            path_and_query,
        })
    }

    /// The value for the handshake request's `Host` header: includes the port
    /// only when the URL explicitly carried a non-default one.
    pub fn host_header(&self) -> String {
        let default_port = if self.use_tls { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `host:port`, suitable for a TCP connect.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
