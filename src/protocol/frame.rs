//! WebSocket frame decoding and encoding (RFC 6455 Section 5.2).
//!
//! Decoding works directly against the receive buffer: a call either yields
//! a complete frame plus the number of bytes it occupied, reports that more
//! bytes are needed, or rejects the buffered bytes as malformed. Nothing is
//! consumed on the "need more data" path, so the same bytes are simply
//! offered again once the next segment arrives.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |     Masking key (if MASK set) |          Payload data         |
//! +-------------------------------+-------------------------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::connection::Role;
use crate::error::{Error, Result};
use crate::message::CloseFrame;
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask_fast, random_mask};

/// Maximum payload size for control frames.
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Largest declared payload length the decoder accepts.
///
/// RFC 6455 requires the most significant bit of the 64-bit length to be
/// zero, so anything above `i64::MAX` is malformed.
pub const MAX_PAYLOAD_LEN: u64 = i64::MAX as u64;

const FIN_BIT: u8 = 0x80;
const RSV_BITS: u8 = 0x70;
const OPCODE_BITS: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN_BITS: u8 = 0x7F;

/// A single decoded or to-be-encoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Whether the frame arrived masked. Ignored when encoding.
    pub masked: bool,
    /// Unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            masked: false,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, data)
    }

    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// Close frame carrying `close` as its payload.
    #[must_use]
    pub fn close(close: &CloseFrame) -> Self {
        Self::new(true, OpCode::Close, close.to_payload())
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// `role` is the role of the receiving endpoint: a server only accepts
    /// masked frames, a client only accepts unmasked ones.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a whole frame, or
    /// `Ok(Some((frame, consumed)))` once it does.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if RSV1-3 is set
    /// - `Error::ReservedOpcode` for opcodes outside 0x0-0x2 and 0x8-0xA
    /// - `Error::FragmentedControlFrame` for a control frame without FIN
    /// - `Error::UnmaskedClientFrame` / `Error::MaskedServerFrame` on a
    ///   masking mismatch
    /// - `Error::PayloadTooLarge` if the 64-bit length has its top bit set or
    ///   does not fit in memory on this platform
    /// - `Error::ControlFrameTooLarge` for a control payload over 125 bytes
    pub fn decode(buf: &[u8], role: Role) -> Result<Option<(Self, usize)>> {
        let [byte0, byte1, ..] = *buf else {
            return Ok(None);
        };

        if byte0 & RSV_BITS != 0 {
            return Err(Error::ReservedBitsSet);
        }
        let fin = byte0 & FIN_BIT != 0;
        let opcode = OpCode::from_u8(byte0 & OPCODE_BITS)?;
        if opcode.is_control() && !fin {
            return Err(Error::FragmentedControlFrame);
        }

        let masked = byte1 & MASK_BIT != 0;
        match (role.expects_masked(), masked) {
            (true, false) => return Err(Error::UnmaskedClientFrame),
            (false, true) => return Err(Error::MaskedServerFrame),
            _ => {}
        }

        let (declared, mut offset) = match byte1 & LEN_BITS {
            126 => match buf.get(2..4) {
                Some(ext) => (u64::from(u16::from_be_bytes([ext[0], ext[1]])), 4),
                None => return Ok(None),
            },
            127 => match buf.get(2..10) {
                Some(ext) => {
                    let mut be = [0u8; 8];
                    be.copy_from_slice(ext);
                    (u64::from_be_bytes(be), 10)
                }
                None => return Ok(None),
            },
            len => (u64::from(len), 2),
        };

        if declared > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge {
                size: declared,
                max: MAX_PAYLOAD_LEN,
            });
        }
        if opcode.is_control() && declared > MAX_CONTROL_FRAME_PAYLOAD as u64 {
            return Err(Error::ControlFrameTooLarge(declared));
        }
        let payload_len = usize::try_from(declared).map_err(|_| Error::PayloadTooLarge {
            size: declared,
            max: usize::MAX as u64,
        })?;

        let mask = if masked {
            let Some(key) = buf.get(offset..offset + 4) else {
                return Ok(None);
            };
            offset += 4;
            Some([key[0], key[1], key[2], key[3]])
        } else {
            None
        };

        let Some(end) = offset.checked_add(payload_len) else {
            return Err(Error::PayloadTooLarge {
                size: declared,
                max: (usize::MAX - offset) as u64,
            });
        };
        let Some(raw) = buf.get(offset..end) else {
            return Ok(None);
        };

        let payload = match mask {
            Some(key) => {
                let mut data = BytesMut::from(raw);
                apply_mask_fast(&mut data, key);
                data.freeze()
            }
            None => Bytes::copy_from_slice(raw),
        };

        Ok(Some((
            Frame {
                fin,
                opcode,
                masked,
                payload,
            },
            end,
        )))
    }

    /// Append the wire form of this frame to `dst`.
    ///
    /// The payload length uses the shortest encoding. When `mask` is given
    /// the MASK bit is set, the key is written and the payload is XORed in
    /// place after copying.
    pub fn encode(&self, dst: &mut BytesMut, mask: Option<[u8; 4]>) {
        dst.reserve(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= FIN_BIT;
        }
        dst.put_u8(byte0);

        let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
        let len = self.payload.len();
        if len <= 125 {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= usize::from(u16::MAX) {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask_fast(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }
    }

    /// Number of bytes [`Frame::encode`] will append.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let len = self.payload.len();
        let length_bytes = if len <= 125 {
            0
        } else if len <= usize::from(u16::MAX) {
            2
        } else {
            8
        };
        2 + length_bytes + if masked { 4 } else { 0 } + len
    }
}

/// Encode a single frame with a fresh mask key when `masked` is set.
///
/// Only the first fragment of a message carries `opcode`; later fragments
/// are written as continuation frames.
///
/// # Errors
///
/// `Error::Io` if a mask key is needed and none can be drawn.
pub fn encode_frame(
    opcode: OpCode,
    payload: &[u8],
    masked: bool,
    fin: bool,
    first_fragment: bool,
) -> Result<Bytes> {
    let opcode = if first_fragment {
        opcode
    } else {
        OpCode::Continuation
    };
    let frame = Frame::new(fin, opcode, Bytes::copy_from_slice(payload));
    let mut buf = BytesMut::new();
    frame.encode(&mut buf, masked.then(random_mask).transpose()?);
    Ok(buf.freeze())
}
