//! The length-prefixed binary frame described in the stream I/O component:
//! a 4-byte little-endian unsigned length prefix followed by exactly that
//! many payload bytes.

use crate::error::{Result, WireError};

/// Frames larger than this are rejected rather than read. 10 MiB.
pub const MAX_FRAME_LEN: u32 = 10 * 1024 * 1024;

/// Validates a length prefix read off the wire. Returns the payload length
/// on success.
pub fn validate_len(len: u32) -> Result<usize> {
    if len == 0 {
        return Err(WireError::EmptyFrame(len));
    }
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len, MAX_FRAME_LEN));
    }
    Ok(len as usize)
}

/// Prepends the 4-byte little-endian length prefix to `payload`, returning
/// the full frame ready to write to the stream.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| WireError::FrameTooLarge(u32::MAX, MAX_FRAME_LEN))?;
    validate_len(len)?;
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_boundary_lengths() {
        assert!(validate_len(MAX_FRAME_LEN).is_ok());
        assert!(validate_len(MAX_FRAME_LEN + 1).is_err());
        assert!(validate_len(0).is_err());
        assert!(validate_len(1).is_ok());
    }

    #[test]
    fn encode_prefixes_little_endian_length() {
        let framed = encode(b"hello").unwrap();
        assert_eq!(&framed[..4], &5u32.to_le_bytes());
        assert_eq!(&framed[4..], b"hello");
    }
}
