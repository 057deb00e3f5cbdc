//! Payload masking (RFC 6455 Section 5.3).

use crate::error::{Error, Result};

/// Byte-by-byte XOR masking.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// XOR masking four bytes at a time.
///
/// Produces exactly the same output as [`apply_mask`]; the tail that does
/// not fill a whole word is handled byte-wise.
///
/// # Example
///
/// ```
/// use streamws::protocol::mask::apply_mask_fast;
///
/// let mask = [0x37, 0xfa, 0x21, 0x3d];
/// let mut data = b"Hello".to_vec();
/// apply_mask_fast(&mut data, mask);
/// assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
/// ```
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ mask_u32;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    for (byte, key) in chunks.into_remainder().iter_mut().zip(mask) {
        *byte ^= key;
    }
}

/// Fresh masking key for an outgoing client frame, drawn from the OS
/// random source.
///
/// # Errors
///
/// `Error::Io` if the random source is unavailable. A predictable key is
/// never substituted.
pub fn random_mask() -> Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    getrandom::getrandom(&mut buf).map_err(|e| Error::Io(e.to_string()))?;
    Ok(buf)
}
