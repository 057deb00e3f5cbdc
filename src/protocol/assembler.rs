//! Data-frame sequencing and text reassembly.
//!
//! Text messages are accumulated and delivered whole. Binary messages are
//! never buffered here: each fragment is handed straight through so the
//! connection can stream it to the consumer.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

#[derive(Debug)]
enum Pending {
    Text {
        buffer: BytesMut,
        /// Prefix of `buffer` already known to be valid UTF-8.
        checked: usize,
    },
    Binary,
}

/// What a data frame produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// Part of a text message; nothing to deliver yet.
    Incomplete,
    /// A complete text message.
    Text(String),
    /// One fragment of a binary message.
    Binary {
        /// First fragment of the message.
        first: bool,
        /// Last fragment of the message.
        fin: bool,
        /// Fragment payload.
        data: Bytes,
    },
}

/// Tracks the message in progress and enforces fragment ordering.
#[derive(Debug)]
pub struct MessageAssembler {
    pending: Option<Pending>,
    max_text_len: usize,
}

impl MessageAssembler {
    /// `max_text_len` caps the size of a reassembled text message.
    #[must_use]
    pub fn new(max_text_len: usize) -> Self {
        Self {
            pending: None,
            max_text_len,
        }
    }

    /// Feed one data frame.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with no message in
    ///   progress, or a new message while one is in progress
    /// - `Error::InvalidUtf8` once a text message can no longer be UTF-8
    /// - `Error::MessageTooLarge` if a text message outgrows the cap
    pub fn push(&mut self, frame: Frame) -> Result<Assembled> {
        debug_assert!(!frame.opcode.is_control());

        match (frame.opcode, self.pending.is_some()) {
            (OpCode::Continuation, false) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Text | OpCode::Binary, true) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (OpCode::Text, false) => {
                self.pending = Some(Pending::Text {
                    buffer: BytesMut::new(),
                    checked: 0,
                });
            }
            (OpCode::Binary, false) => {
                if frame.fin {
                    return Ok(Assembled::Binary {
                        first: true,
                        fin: true,
                        data: frame.payload,
                    });
                }
                self.pending = Some(Pending::Binary);
                return Ok(Assembled::Binary {
                    first: true,
                    fin: false,
                    data: frame.payload,
                });
            }
            _ => {}
        }

        match &mut self.pending {
            Some(Pending::Binary) => {
                if frame.fin {
                    self.pending = None;
                }
                Ok(Assembled::Binary {
                    first: false,
                    fin: frame.fin,
                    data: frame.payload,
                })
            }
            Some(Pending::Text { buffer, checked }) => {
                let size = buffer.len() + frame.payload.len();
                if size > self.max_text_len {
                    self.pending = None;
                    return Err(Error::MessageTooLarge {
                        size,
                        max: self.max_text_len,
                    });
                }
                buffer.extend_from_slice(&frame.payload);

                // a trailing partial character is fine until the last fragment
                let valid = match std::str::from_utf8(&buffer[*checked..]) {
                    Ok(_) => Some(buffer.len()),
                    Err(e) if e.error_len().is_none() && !frame.fin => {
                        Some(*checked + e.valid_up_to())
                    }
                    Err(_) => None,
                };
                match valid {
                    Some(end) => *checked = end,
                    None => {
                        self.pending = None;
                        return Err(Error::InvalidUtf8);
                    }
                }

                if !frame.fin {
                    return Ok(Assembled::Incomplete);
                }
                let Some(Pending::Text { buffer, .. }) = self.pending.take() else {
                    return Ok(Assembled::Incomplete);
                };
                let text = String::from_utf8(buffer.to_vec())?;
                Ok(Assembled::Text(text))
            }
            None => Ok(Assembled::Incomplete),
        }
    }

    /// Drop any message in progress.
    ///
    /// Returns `true` if that message was a binary stream, which the caller
    /// must still terminate.
    pub fn reset(&mut self) -> bool {
        matches!(self.pending.take(), Some(Pending::Binary))
    }
}
