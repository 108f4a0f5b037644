use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;
use url::ParseError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    #[error("channel communication error")]
    CommunicationError,

    // Handshake errors
    #[error("{source}")]
    URLParseError {
        #[from]
        source: ParseError,
    },

    #[error("Invalid scheme in WebSocket URL, must be ws:// or wss://")]
    InvalidSchemeURL,

    #[error("URL has no host")]
    URLNoHost,

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: httparse::Error,
    },

    #[error("incomplete handshake response")]
    IncompleteHandshakeResponse,

    #[error("server didn't respond with 101 Switching Protocols")]
    HandshakeFailed,

    #[error("server's Sec-WebSocket-Accept value doesn't match the expected derivation")]
    InvalidAcceptKey,

    #[error("server sent a malformed handshake response")]
    InvalidResponse,

    // Framing errors
    #[error("non-zero RSV bit without a negotiated extension")]
    RSVNotZero,

    #[error("control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("control frame payload exceeds 125 bytes")]
    ControlFrameTooBig,

    #[error("frame payload exceeds the configured max_frame_size")]
    FrameTooLarge,

    #[error("text frame payload is not valid UTF-8")]
    InvalidUTF8,

    #[error("close frame carries an out-of-range status code")]
    InvalidCloseCode,

    #[error("close frame payload is one byte (a status code needs at least two)")]
    InvalidCloseFramePayload,

    #[error("invalid opcode")]
    InvalidOpcode,

    #[error("protocol error: {0}")]
    ProtocolError(String),

    // Fragmentation errors
    #[error("data frame received while a fragmented message is already in progress")]
    InvalidFrameFragmentation,

    #[error("continuation frame received but no fragmented message is in progress")]
    InvalidContinuationFrame,

    // State machine errors
    #[error("operation requires an open connection")]
    NotConnected,

    #[error("operation is not valid in the current connection state")]
    InvalidState,

    #[error("received an opcode that is not valid in this context")]
    UnexpectedOpcode,

    #[error("the connection is closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),
}
