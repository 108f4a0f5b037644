//! A client-side implementation of the [WebSocket Protocol RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455),
//! built on tokio.
//!
//! This crate covers the core of a WebSocket client: the frame codec, the
//! masking unit, the opening handshake, and the per-connection state machine
//! that reassembles fragmented messages and drives keepalive. It does not
//! implement the server role, extensions (including permessage-deflate), or
//! TLS — callers needing `wss://` supply their own [`transport::Transport`].
//!
//! ```ignore
//! use ws_core::WebSocketClient;
//! use tokio_stream::StreamExt;
//!
//! let mut client = WebSocketClient::connect("ws://localhost:9000/").await?;
//! client.send_text("hello").await?;
//! while let Some(item) = client.next().await {
//!     println!("{item:?}");
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod fragment;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod message;
pub mod state;
pub mod transport;
pub mod url;

pub use codec::FrameCodec;
pub use config::WebSocketConfig;
pub use connection::WebSocketClient;
pub use error::Error;
pub use frame::{Frame, OpCode};
pub use message::{Message, StreamItem};
pub use state::ConnectionState;
pub use transport::{TcpTransport, Transport};
pub use url::WebSocketUrl;
