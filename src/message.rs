//! The message surface (C5): completed, reassembled application messages.

use crate::error::Error;
use crate::frame::OpCode;

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    /// Builds a `Message` from a completed (opcode, payload) pair, as produced
    /// by the fragment buffer or a standalone fin=true data frame.
    pub fn from_completed(opcode: OpCode, payload: Vec<u8>) -> Result<Self, Error> {
        match opcode {
            OpCode::Text => Ok(Message::Text(String::from_utf8(payload)?)),
            OpCode::Binary => Ok(Message::Binary(payload)),
            _ => Err(Error::InvalidOpcode),
        }
    }

    pub fn as_binary(&self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(data) => data.clone(),
        }
    }

    pub fn as_text(&self) -> Result<String, Error> {
        match self {
            Message::Text(text) => Ok(text.clone()),
            Message::Binary(data) => Ok(String::from_utf8(data.clone())?),
        }
    }
}

/// Item delivered on the public message stream (§4.5). The stream yields
/// completed messages as they arrive and, at most once, a final
/// `TerminalError` right before the stream ends.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Text(String),
    Binary(Vec<u8>),
    TerminalError(String),
}

impl From<Message> for StreamItem {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => StreamItem::Text(text),
            Message::Binary(data) => StreamItem::Binary(data),
        }
    }
}
