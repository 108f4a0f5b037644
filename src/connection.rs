//! The public client facade (A6): wires the codec, fragment-aware state
//! machine and transport into the actor model described in §5 — a reader
//! task, a timer task, and a shared, mutex-guarded state machine. Neither
//! mutex is ever held across an `.await` on the transport.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;
use log::warn;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::codec::FrameCodec;
use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::handshake::{build_request, verify_response};
use crate::message::StreamItem;
use crate::state::{Action, ConnectionState, Event, StateMachine};
use crate::transport::{TcpTransport, Transport};
use crate::url::WebSocketUrl;

const MESSAGE_CHANNEL_CAPACITY: usize = 128;
const HANDSHAKE_READ_CHUNK: usize = 4096;
const MAX_HANDSHAKE_RESPONSE_SIZE: usize = 16 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// A single client-side WebSocket connection.
///
/// Implements [`Stream`] over completed messages; dropping the client aborts
/// its background reader and keepalive tasks.
pub struct WebSocketClient {
    state: Arc<Mutex<StateMachine>>,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    codec: FrameCodec,
    message_rx: ReceiverStream<StreamItem>,
    reader_handle: JoinHandle<()>,
    timer_handle: JoinHandle<()>,
}

impl WebSocketClient {
    pub async fn connect(url: &str) -> Result<Self, Error> {
        Self::connect_with_config(url, WebSocketConfig::default()).await
    }

    pub async fn connect_with_config(url: &str, config: WebSocketConfig) -> Result<Self, Error> {
        let parsed = WebSocketUrl::parse(url)?;
        if parsed.use_tls {
            // TLS is out of scope for this crate's own connector; callers that
            // need wss:// supply their own Transport (e.g. wrapping tokio-rustls).
            return Err(Error::InvalidSchemeURL);
        }
        let transport = TcpTransport::connect(&parsed.authority()).await?;
        Self::connect_with_transport(Box::new(transport), parsed, config).await
    }

    /// Entry point for callers supplying their own transport (TLS, a test
    /// double, anything implementing [`Transport`]).
    pub async fn connect_with_transport(
        mut transport: Box<dyn Transport>,
        url: WebSocketUrl,
        config: WebSocketConfig,
    ) -> Result<Self, Error> {
        let request = build_request(&url);
        transport.send_all(&request.bytes).await?;

        let mut buf = Vec::new();
        let header_end = loop {
            if let Some(end) = find_header_terminator(&buf) {
                break end;
            }
            if buf.len() > MAX_HANDSHAKE_RESPONSE_SIZE {
                return Err(Error::InvalidResponse);
            }
            let chunk = transport.recv_some(HANDSHAKE_READ_CHUNK).await?;
            if chunk.is_empty() {
                return Err(Error::IncompleteHandshakeResponse);
            }
            buf.extend_from_slice(&chunk);
        };

        verify_response(&buf[..header_end], &request.key)?;
        let leftover = buf[header_end..].to_vec();

        let mut machine = StateMachine::new(config.clone());
        machine.handle(Event::Connect)?;
        machine.handle(Event::HandshakeOk { now: Instant::now() })?;

        let state = Arc::new(Mutex::new(machine));
        let transport = Arc::new(Mutex::new(transport));
        let codec = FrameCodec::from_config(&config);
        let (tx, rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);

        let reader_handle = tokio::spawn(run_reader(
            transport.clone(),
            state.clone(),
            codec.clone(),
            tx.clone(),
            leftover,
        ));
        let timer_handle = tokio::spawn(run_timer(
            transport.clone(),
            state.clone(),
            codec.clone(),
            tx,
            config.ping_interval,
        ));

        Ok(Self {
            state,
            transport,
            codec,
            message_rx: ReceiverStream::new(rx),
            reader_handle,
            timer_handle,
        })
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), Error> {
        let actions = {
            let mut machine = self.state.lock().await;
            machine.handle(Event::SendText(text.into()))?
        };
        self.run_actions(actions).await
    }

    pub async fn send_binary(&self, data: Vec<u8>) -> Result<(), Error> {
        let actions = {
            let mut machine = self.state.lock().await;
            machine.handle(Event::SendBinary(data))?
        };
        self.run_actions(actions).await
    }

    pub async fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<(), Error> {
        let actions = {
            let mut machine = self.state.lock().await;
            machine.handle(Event::CloseRequested { code, reason })?
        };
        self.run_actions(actions).await
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.state()
    }

    async fn run_actions(&self, actions: Vec<Action>) -> Result<(), Error> {
        for action in actions {
            match action {
                Action::SendFrame(frame) => {
                    let bytes = self.codec.encode(&frame, None)?;
                    self.transport.lock().await.send_all(&bytes).await?;
                }
                Action::Deliver(_) => {
                    // Locally originated events never produce a Deliver action.
                }
                Action::CloseTransport => {
                    self.transport.lock().await.close().await?;
                }
            }
        }
        Ok(())
    }
}

impl Stream for WebSocketClient {
    type Item = StreamItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.message_rx).poll_next(cx)
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.timer_handle.abort();
    }
}

fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Executes actions on behalf of a background task. Transport/encode failures
/// here have no caller to propagate to, so they're logged; `CloseTransport`
/// still ends the task's loop.
async fn execute_actions(
    actions: Vec<Action>,
    codec: &FrameCodec,
    transport: &Arc<Mutex<Box<dyn Transport>>>,
    tx: &mpsc::Sender<StreamItem>,
) -> bool {
    for action in actions {
        match action {
            Action::SendFrame(frame) => match codec.encode(&frame, None) {
                Ok(bytes) => {
                    if let Err(err) = transport.lock().await.send_all(&bytes).await {
                        warn!("failed to write frame to transport: {err}");
                    }
                }
                Err(err) => warn!("failed to encode outgoing frame: {err}"),
            },
            Action::Deliver(item) => {
                if tx.send(item).await.is_err() {
                    return false;
                }
            }
            Action::CloseTransport => {
                if let Err(err) = transport.lock().await.close().await {
                    warn!("failed to close transport: {err}");
                }
                return false;
            }
        }
    }
    true
}

async fn run_reader(
    transport: Arc<Mutex<Box<dyn Transport>>>,
    state: Arc<Mutex<StateMachine>>,
    codec: FrameCodec,
    tx: mpsc::Sender<StreamItem>,
    mut buf: Vec<u8>,
) {
    loop {
        loop {
            match codec.decode(&buf) {
                Ok(Some((frame, consumed))) => {
                    buf.drain(..consumed);
                    let now = Instant::now();
                    let actions = {
                        let mut machine = state.lock().await;
                        match machine.handle(Event::FrameReceived { frame, now }) {
                            Ok(actions) => actions,
                            Err(err) => {
                                warn!("protocol violation: {err}");
                                let _ = tx.send(StreamItem::TerminalError(err.to_string())).await;
                                return;
                            }
                        }
                    };
                    if !execute_actions(actions, &codec, &transport, &tx).await {
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    // A hard decode failure still gets a matching Close sent
                    // before the stream ends, per the policy in §7.
                    let actions = {
                        let mut machine = state.lock().await;
                        machine.handle_decode_error(&err)
                    };
                    execute_actions(actions, &codec, &transport, &tx).await;
                    let _ = tx.send(StreamItem::TerminalError(err.to_string())).await;
                    return;
                }
            }
        }

        let chunk = match transport.lock().await.recv_some(READ_CHUNK_SIZE).await {
            Ok(chunk) if chunk.is_empty() => {
                let actions = {
                    let mut machine = state.lock().await;
                    machine.handle(Event::TransportClosed).unwrap_or_default()
                };
                execute_actions(actions, &codec, &transport, &tx).await;
                return;
            }
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = tx.send(StreamItem::TerminalError(err.to_string())).await;
                return;
            }
        };
        buf.extend_from_slice(&chunk);
    }
}

async fn run_timer(
    transport: Arc<Mutex<Box<dyn Transport>>>,
    state: Arc<Mutex<StateMachine>>,
    codec: FrameCodec,
    tx: mpsc::Sender<StreamItem>,
    ping_interval: Duration,
) {
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.tick().await; // first tick fires immediately; it's not a real period.

    loop {
        ticker.tick().await;
        let now = Instant::now();
        let actions = {
            let mut machine = state.lock().await;
            if machine.state() != ConnectionState::Open {
                return;
            }
            machine.handle(Event::TimerTick { now }).unwrap_or_default()
        };
        if !execute_actions(actions, &codec, &transport, &tx).await {
            return;
        }
    }
}
