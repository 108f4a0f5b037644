//! The transport contract (A4): a byte-stream handle the core consumes without
//! caring whether it's plaintext TCP or something a caller wrapped in TLS.

use crate::error::Error;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Reliable, ordered, full-duplex byte stream (§6).
///
/// `recv_some` returning an empty `Vec` means the peer closed its write side
/// (EOF), not an error.
#[async_trait]
pub trait Transport: Send {
    async fn send_all(&mut self, bytes: &[u8]) -> Result<(), Error>;
    async fn recv_some(&mut self, max: usize) -> Result<Vec<u8>, Error>;
    async fn close(&mut self) -> Result<(), Error>;
}

/// The default connector for `ws://` URLs.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub async fn connect(authority: &str) -> Result<Self, Error> {
        let stream = TcpStream::connect(authority)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { stream })
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn recv_some(&mut self, max: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; max];
        let n = self
            .stream
            .read(&mut buf)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        buf.truncate(n);
        Ok(buf)
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}
