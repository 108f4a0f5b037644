//! The handshake validator (C3): builds the client opening request and
//! verifies the server's 101-Switching-Protocols response.

use crate::error::Error;
use crate::url::WebSocketUrl;
use base64::prelude::*;
use rand::RngCore;
use sha1::{Digest, Sha1};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// A freshly generated `Sec-WebSocket-Key` plus the raw request bytes that
/// carry it, ready to be written to the transport.
pub struct HandshakeRequest {
    pub key: String,
    pub bytes: Vec<u8>,
}

pub fn generate_websocket_key() -> String {
    let mut random_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    BASE64_STANDARD.encode(random_bytes)
}

pub fn accept_key_for(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Builds the GET-with-Upgrade request described in §6.
pub fn build_request(url: &WebSocketUrl) -> HandshakeRequest {
    let key = generate_websocket_key();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: {}\r\nSec-WebSocket-Version: 13\r\n\r\n",
        url.path_and_query,
        url.host_header(),
        key,
    );
    HandshakeRequest {
        key,
        bytes: request.into_bytes(),
    }
}

/// Validates the server's response against the key used to build the request.
///
/// `response` must contain the full status line and header block (the caller
/// is responsible for reading until `\r\n\r\n`); any trailing bytes belong to
/// the first WebSocket frame and are not consumed here.
pub fn verify_response(response: &[u8], client_key: &str) -> Result<(), Error> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut parsed = httparse::Response::new(&mut headers);

    match parsed.parse(response)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(Error::IncompleteHandshakeResponse),
    }

    if parsed.code != Some(101) {
        return Err(Error::HandshakeFailed);
    }

    let upgrade_ok = header_value(&parsed, "upgrade")
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if !upgrade_ok {
        return Err(Error::HandshakeFailed);
    }

    let connection_ok = header_value(&parsed, "connection")
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false);
    if !connection_ok {
        return Err(Error::HandshakeFailed);
    }

    let accept = header_value(&parsed, "sec-websocket-accept").ok_or(Error::InvalidAcceptKey)?;
    if accept != accept_key_for(client_key) {
        return Err(Error::InvalidAcceptKey);
    }

    Ok(())
}

fn header_value<'a>(response: &'a httparse::Response, name: &str) -> Option<&'a str> {
    response
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .and_then(|h| std::str::from_utf8(h.value).ok())
}
