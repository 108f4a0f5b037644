//! The fragmentation buffer: reassembles Text/Binary messages split across
//! Continuation frames, validating Text incrementally so a legal UTF-8 stream
//! split at an arbitrary byte boundary is never rejected (§3, §9, REDESIGN FLAGS).

use crate::error::Error;
use crate::frame::OpCode;

#[derive(Debug)]
enum Inner {
    Idle,
    Collecting {
        opcode: OpCode,
        accumulated: Vec<u8>,
        /// Trailing bytes of `accumulated` that form an incomplete UTF-8
        /// codepoint, carried so the next fragment can complete it before
        /// validation runs again. Only ever populated for `OpCode::Text`.
        partial_utf8: Vec<u8>,
    },
}

#[derive(Debug)]
pub struct FragmentBuffer {
    inner: Inner,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        Self { inner: Inner::Idle }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.inner, Inner::Idle)
    }

    /// Starts a new fragmented message. Fails if one is already in progress.
    pub fn start(&mut self, opcode: OpCode, first_chunk: Vec<u8>) -> Result<(), Error> {
        if !self.is_idle() {
            return Err(Error::InvalidFrameFragmentation);
        }
        let partial_utf8 = if opcode == OpCode::Text {
            validate_prefix(&first_chunk)?
        } else {
            Vec::new()
        };
        self.inner = Inner::Collecting {
            opcode,
            accumulated: first_chunk,
            partial_utf8,
        };
        Ok(())
    }

    /// Appends a continuation chunk. `fin` indicates whether this is the final
    /// fragment; on `fin == true` the assembled `(opcode, payload)` is returned
    /// and the buffer resets to `Idle`.
    pub fn append(&mut self, chunk: Vec<u8>, fin: bool) -> Result<Option<(OpCode, Vec<u8>)>, Error> {
        match &mut self.inner {
            Inner::Idle => Err(Error::InvalidContinuationFrame),
            Inner::Collecting {
                opcode,
                accumulated,
                partial_utf8,
            } => {
                if *opcode == OpCode::Text {
                    let mut candidate = std::mem::take(partial_utf8);
                    candidate.extend_from_slice(&chunk);
                    let leftover = validate_prefix(&candidate)?;
                    let consumed_len = candidate.len() - leftover.len();
                    accumulated.extend_from_slice(&candidate[..consumed_len]);
                    *partial_utf8 = leftover;

                    if fin && !partial_utf8.is_empty() {
                        // A codepoint never completed by message end.
                        return Err(Error::InvalidUTF8);
                    }
                } else {
                    accumulated.extend_from_slice(&chunk);
                }

                if fin {
                    let opcode = *opcode;
                    let payload = std::mem::take(accumulated);
                    self.inner = Inner::Idle;
                    Ok(Some((opcode, payload)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        match &self.inner {
            Inner::Idle => 0,
            Inner::Collecting { accumulated, partial_utf8, .. } => {
                accumulated.len() + partial_utf8.len()
            }
        }
    }
}

impl Default for FragmentBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates `buf` as a prefix of a UTF-8 stream: every byte except possibly a
/// trailing incomplete multibyte sequence must form valid UTF-8. Returns the
/// trailing incomplete bytes (empty if `buf` ends on a codepoint boundary), or
/// an error if `buf` contains a sequence that can never become valid UTF-8.
fn validate_prefix(buf: &[u8]) -> Result<Vec<u8>, Error> {
    match std::str::from_utf8(buf) {
        Ok(_) => Ok(Vec::new()),
        Err(err) => {
            let valid_up_to = err.valid_up_to();
            match err.error_len() {
                // A definite invalid sequence (not just "ran out of bytes").
                Some(_) => Err(Error::InvalidUTF8),
                // `buf` ends mid-codepoint; stash the tail and validate it once
                // more bytes arrive. A genuinely malformed tail longer than 4
                // bytes (the max UTF-8 sequence length) can never complete.
                None => {
                    let tail = &buf[valid_up_to..];
                    if tail.len() > 3 {
                        Err(Error::InvalidUTF8)
                    } else {
                        Ok(tail.to_vec())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let buf = FragmentBuffer::new();
        assert!(buf.is_idle());
    }

    #[test]
    fn simple_text_fragmentation() {
        let mut buf = FragmentBuffer::new();
        buf.start(OpCode::Text, b"He".to_vec()).unwrap();
        assert!(!buf.is_idle());
        let result = buf.append(b"llo".to_vec(), true).unwrap();
        let (opcode, payload) = result.unwrap();
        assert_eq!(opcode, OpCode::Text);
        assert_eq!(payload, b"Hello");
        assert!(buf.is_idle());
    }

    #[test]
    fn starting_while_collecting_is_an_error() {
        let mut buf = FragmentBuffer::new();
        buf.start(OpCode::Text, b"He".to_vec()).unwrap();
        assert!(matches!(
            buf.start(OpCode::Text, b"y".to_vec()),
            Err(Error::InvalidFrameFragmentation)
        ));
    }

    #[test]
    fn continuation_while_idle_is_an_error() {
        let mut buf = FragmentBuffer::new();
        assert!(matches!(
            buf.append(b"x".to_vec(), true),
            Err(Error::InvalidContinuationFrame)
        ));
    }

    #[test]
    fn split_multibyte_codepoint_across_fragments_is_accepted() {
        // "€" is U+20AC, encoded as the 3 bytes E2 82 AC.
        let euro = "€".as_bytes().to_vec();
        assert_eq!(euro.len(), 3);

        let mut buf = FragmentBuffer::new();
        buf.start(OpCode::Text, euro[..1].to_vec()).unwrap();
        let result = buf.append(euro[1..].to_vec(), true).unwrap();
        let (_, payload) = result.unwrap();
        assert_eq!(String::from_utf8(payload).unwrap(), "€");
    }

    #[test]
    fn split_multibyte_codepoint_across_three_fragments_is_accepted() {
        let euro = "€".as_bytes().to_vec();
        let mut buf = FragmentBuffer::new();
        buf.start(OpCode::Text, euro[..1].to_vec()).unwrap();
        assert!(buf.append(euro[1..2].to_vec(), false).unwrap().is_none());
        let (_, payload) = buf.append(euro[2..].to_vec(), true).unwrap().unwrap();
        assert_eq!(String::from_utf8(payload).unwrap(), "€");
    }

    #[test]
    fn invalid_utf8_byte_sequence_is_rejected_immediately() {
        let mut buf = FragmentBuffer::new();
        let result = buf.start(OpCode::Text, vec![0xFF, 0xFE]);
        assert!(matches!(result, Err(Error::InvalidUTF8)));
    }

    #[test]
    fn truncated_codepoint_at_message_end_is_rejected() {
        let euro = "€".as_bytes().to_vec();
        let mut buf = FragmentBuffer::new();
        buf.start(OpCode::Text, euro[..2].to_vec()).unwrap();
        // fin=true but the codepoint never completes.
        let result = buf.append(Vec::new(), true);
        assert!(matches!(result, Err(Error::InvalidUTF8)));
    }

    #[test]
    fn binary_fragmentation_does_not_validate_utf8() {
        let mut buf = FragmentBuffer::new();
        buf.start(OpCode::Binary, vec![0xFF]).unwrap();
        let (opcode, payload) = buf.append(vec![0xFE], true).unwrap().unwrap();
        assert_eq!(opcode, OpCode::Binary);
        assert_eq!(payload, vec![0xFF, 0xFE]);
    }
}
