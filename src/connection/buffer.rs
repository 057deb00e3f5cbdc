//! Bounded receive buffer.

use std::ops::Deref;

use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};

/// Bytes received from the transport but not yet decoded.
///
/// Consuming a decoded prefix only moves the start cursor; the remaining
/// bytes are never shifted, so decoding many small frames out of one large
/// read stays linear.
#[derive(Debug)]
pub struct ReceiveBuffer {
    buf: BytesMut,
    max_len: usize,
}

impl ReceiveBuffer {
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_len,
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Drop the first `n` bytes.
    pub fn consume(&mut self, n: usize) {
        self.buf.advance(n.min(self.buf.len()));
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    #[must_use]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Fail once more than `max_len` bytes are held.
    ///
    /// # Errors
    ///
    /// Returns `Error::BufferOverflow` when the ceiling is exceeded.
    pub fn check_limit(&self) -> Result<()> {
        if self.buf.len() > self.max_len {
            return Err(Error::BufferOverflow {
                size: self.buf.len(),
                max: self.max_len,
            });
        }
        Ok(())
    }
}

impl Deref for ReceiveBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}
