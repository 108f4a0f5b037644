//! The connection state machine (C4): a pure transition function over frames,
//! timer ticks and user requests. It never touches the transport directly —
//! it returns `Action`s for the connection actor (`connection.rs`) to carry out,
//! which keeps the hardest logic in this crate testable without a socket.

use std::time::{Duration, Instant};

use crate::config::WebSocketConfig;
use crate::fragment::FragmentBuffer;
use crate::frame::{is_close_code_valid, sanitize_outgoing_close_code, Frame, OpCode};
use crate::message::{Message, StreamItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Events fed into the state machine. Timestamps are passed in rather than
/// read from the clock so transitions stay deterministic and testable.
#[derive(Debug)]
pub enum Event {
    Connect,
    HandshakeOk { now: Instant },
    HandshakeFail,
    FrameReceived { frame: Frame, now: Instant },
    SendText(String),
    SendBinary(Vec<u8>),
    CloseRequested { code: Option<u16>, reason: Option<String> },
    TransportClosed,
    TimerTick { now: Instant },
}

/// Something the connection actor must do in response to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendFrame(Frame),
    Deliver(StreamItem),
    CloseTransport,
}

#[derive(Debug)]
pub struct StateMachine {
    state: ConnectionState,
    config: WebSocketConfig,
    fragments: FragmentBuffer,
    last_rx: Option<Instant>,
}

impl StateMachine {
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            fragments: FragmentBuffer::new(),
            last_rx: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn handle(&mut self, event: Event) -> Result<Vec<Action>, crate::error::Error> {
        use crate::error::Error;

        match event {
            Event::Connect => {
                if self.state != ConnectionState::Disconnected {
                    return Err(Error::InvalidState);
                }
                self.state = ConnectionState::Connecting;
                Ok(vec![])
            }

            Event::HandshakeOk { now } => {
                if self.state != ConnectionState::Connecting {
                    return Err(Error::InvalidState);
                }
                self.state = ConnectionState::Open;
                self.last_rx = Some(now);
                Ok(vec![])
            }

            Event::HandshakeFail => {
                self.state = ConnectionState::Disconnected;
                Ok(vec![])
            }

            Event::TransportClosed => {
                let was_open = self.state != ConnectionState::Closed;
                self.state = if matches!(self.state, ConnectionState::Connecting) {
                    ConnectionState::Disconnected
                } else {
                    ConnectionState::Closed
                };
                if was_open {
                    Ok(vec![Action::CloseTransport])
                } else {
                    Ok(vec![])
                }
            }

            Event::SendText(text) => self.handle_send(Message::Text(text)),
            Event::SendBinary(data) => self.handle_send(Message::Binary(data)),

            Event::CloseRequested { code, reason } => self.handle_close_requested(code, reason),

            Event::FrameReceived { frame, now } => {
                self.last_rx = Some(now);
                self.handle_frame(frame)
            }

            Event::TimerTick { now } => self.handle_timer(now),
        }
    }

    fn handle_send(&mut self, message: Message) -> Result<Vec<Action>, crate::error::Error> {
        use crate::error::Error;

        match self.state {
            ConnectionState::Open => {}
            ConnectionState::Closing | ConnectionState::Closed => return Err(Error::ConnectionClosed),
            ConnectionState::Disconnected | ConnectionState::Connecting => return Err(Error::NotConnected),
        }
        let opcode = match &message {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
        };
        let frame = Frame::new(true, opcode, message.as_binary());
        Ok(vec![Action::SendFrame(frame)])
    }

    fn handle_close_requested(
        &mut self,
        code: Option<u16>,
        reason: Option<String>,
    ) -> Result<Vec<Action>, crate::error::Error> {
        match self.state {
            ConnectionState::Open => {
                let payload = build_close_payload(
                    code.unwrap_or(1000),
                    reason.as_deref().unwrap_or(""),
                    self.config.max_control_frame_size,
                );
                self.state = ConnectionState::Closing;
                Ok(vec![Action::SendFrame(Frame::control(OpCode::Close, payload))])
            }
            ConnectionState::Closing | ConnectionState::Closed => Ok(vec![]),
            _ => Err(crate::error::Error::NotConnected),
        }
    }

    fn handle_timer(&mut self, now: Instant) -> Result<Vec<Action>, crate::error::Error> {
        if self.state != ConnectionState::Open {
            return Ok(vec![]);
        }
        let idle_for = self
            .last_rx
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::ZERO);

        if idle_for > self.config.idle_timeout {
            let payload = build_close_payload(1001, "timeout", self.config.max_control_frame_size);
            self.state = ConnectionState::Closing;
            Ok(vec![Action::SendFrame(Frame::control(OpCode::Close, payload))])
        } else {
            Ok(vec![Action::SendFrame(Frame::control(OpCode::Ping, Vec::new()))])
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<Vec<Action>, crate::error::Error> {
        if self.state == ConnectionState::Closing {
            // The reciprocal Close — whichever side spoke first, receiving the
            // other side's Close completes the closing handshake.
            if frame.opcode == OpCode::Close {
                self.state = ConnectionState::Closed;
                return Ok(vec![Action::CloseTransport]);
            }
            return Ok(vec![]);
        }

        if self.state != ConnectionState::Open {
            return Ok(vec![]);
        }

        if frame.rsv1 || frame.rsv2 || frame.rsv3 {
            return Ok(self.protocol_error(1002));
        }

        match frame.opcode {
            OpCode::Ping => Ok(vec![Action::SendFrame(Frame::control(OpCode::Pong, frame.payload))]),
            OpCode::Pong => Ok(vec![]),
            OpCode::Close => Ok(self.handle_close_frame(frame.payload)),
            OpCode::Text | OpCode::Binary => self.handle_data_frame(frame),
            OpCode::Continue => self.handle_continuation_frame(frame),
        }
    }

    fn handle_data_frame(&mut self, frame: Frame) -> Result<Vec<Action>, crate::error::Error> {
        if !self.fragments.is_idle() {
            return Ok(self.protocol_error(1002));
        }

        if frame.fin {
            match Message::from_completed(frame.opcode, frame.payload) {
                Ok(message) => Ok(vec![Action::Deliver(message.into())]),
                Err(_) => Ok(self.protocol_error(1007)),
            }
        } else {
            match self.fragments.start(frame.opcode, frame.payload) {
                Ok(()) => Ok(vec![]),
                Err(_) => Ok(self.protocol_error(1007)),
            }
        }
    }

    fn handle_continuation_frame(&mut self, frame: Frame) -> Result<Vec<Action>, crate::error::Error> {
        if self.fragments.is_idle() {
            return Ok(self.protocol_error(1002));
        }

        match self.fragments.append(frame.payload, frame.fin) {
            Ok(Some((opcode, payload))) => match Message::from_completed(opcode, payload) {
                Ok(message) => Ok(vec![Action::Deliver(message.into())]),
                Err(_) => Ok(self.protocol_error(1007)),
            },
            Ok(None) => Ok(vec![]),
            Err(_) => Ok(self.protocol_error(1007)),
        }
    }

    /// Handles a peer-initiated Close received while `Open`. A well-formed
    /// close completes the handshake immediately: the client has both
    /// received and answered the Close, so there's nothing left to wait for.
    fn handle_close_frame(&mut self, payload: Vec<u8>) -> Vec<Action> {
        use crate::error::Error;

        match parse_close_payload(&payload) {
            Ok((code, _reason)) => {
                let reply_code = sanitize_outgoing_close_code(code.unwrap_or(1000));
                self.state = ConnectionState::Closed;
                vec![
                    Action::SendFrame(Frame::control(OpCode::Close, reply_code.to_be_bytes().to_vec())),
                    Action::CloseTransport,
                ]
            }
            Err(Error::InvalidCloseFramePayload) | Err(Error::InvalidCloseCode) => self.protocol_error(1002),
            Err(Error::InvalidUTF8) => self.protocol_error(1007),
            Err(_) => self.protocol_error(1011),
        }
    }

    fn protocol_error(&mut self, code: u16) -> Vec<Action> {
        self.state = ConnectionState::Closing;
        let payload = build_close_payload(code, "", self.config.max_control_frame_size);
        vec![Action::SendFrame(Frame::control(OpCode::Close, payload))]
    }

    /// Maps a hard decode failure to the matching outbound Close, per §7's
    /// policy table. A no-op outside `Open` (nothing left to close cleanly).
    pub fn handle_decode_error(&mut self, err: &crate::error::Error) -> Vec<Action> {
        use crate::error::Error;

        if self.state != ConnectionState::Open {
            return vec![];
        }
        let code = match err {
            Error::InvalidOpcode | Error::ControlFramesFragmented => 1002,
            Error::ControlFrameTooBig | Error::FrameTooLarge => 1009,
            Error::InvalidUTF8 => 1007,
            _ => 1011,
        };
        self.protocol_error(code)
    }
}

/// Parses an incoming Close frame payload per §4.4's close frame payload rules.
fn parse_close_payload(payload: &[u8]) -> Result<(Option<u16>, Option<String>), crate::error::Error> {
    use crate::error::Error;

    match payload.len() {
        0 => Ok((None, None)),
        1 => Err(Error::InvalidCloseFramePayload),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            if !is_close_code_valid(code) {
                return Err(Error::InvalidCloseCode);
            }
            let reason = String::from_utf8(payload[2..].to_vec()).map_err(|_| Error::InvalidUTF8)?;
            Ok((Some(code), Some(reason)))
        }
    }
}

/// Builds an outgoing Close payload, truncating the reason on a UTF-8
/// character boundary if it would overflow `max_control_frame_size`.
fn build_close_payload(code: u16, reason: &str, max_control_frame_size: usize) -> Vec<u8> {
    let code = sanitize_outgoing_close_code(code);
    let mut payload = code.to_be_bytes().to_vec();

    let available = max_control_frame_size.saturating_sub(2);
    let reason = truncate_utf8(reason, available);
    payload.extend_from_slice(reason.as_bytes());
    payload
}

fn truncate_utf8(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
