//! Frame-level types of RFC 6455 base framing.

use bytes::Bytes;

use crate::error::ProtocolError;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    /// Close, Ping and Pong.
    #[inline]
    pub fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// One decoded frame. The payload is always unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    /// Whether the frame arrived with a masking key.
    pub masked: bool,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: OpCode, payload: impl Into<Bytes>, fin: bool) -> Self {
        Self {
            fin,
            opcode,
            masked: false,
            payload: payload.into(),
        }
    }
}

/// XOR `buf` in place with `key`, byte `i` against `key[i % 4]`.
///
/// Applying the same key twice restores the input.
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        for (b, k) in chunk.iter_mut().zip(key) {
            *b ^= k;
        }
    }
    for (b, k) in chunks.into_remainder().iter_mut().zip(key) {
        *b ^= k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values() {
        for (byte, op) in [
            (0x0, OpCode::Continuation),
            (0x1, OpCode::Text),
            (0x2, OpCode::Binary),
            (0x8, OpCode::Close),
            (0x9, OpCode::Ping),
            (0xA, OpCode::Pong),
        ] {
            assert_eq!(OpCode::try_from(byte), Ok(op));
            assert_eq!(op as u8, byte);
        }
        for byte in [0x3, 0x7, 0xB, 0xF] {
            assert_eq!(
                OpCode::try_from(byte),
                Err(ProtocolError::UnknownOpcode(byte))
            );
        }
    }

    #[test]
    fn control_classification() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Binary.is_control());
        assert!(!OpCode::Continuation.is_control());
    }

    #[test]
    fn mask_is_an_involution() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let original: Vec<u8> = (0..=255u8).cycle().take(1031).collect();
        let mut buf = original.clone();
        apply_mask(&mut buf, key);
        assert_ne!(buf, original);
        apply_mask(&mut buf, key);
        assert_eq!(buf, original);
    }

    #[test]
    fn mask_matches_rfc_example() {
        // RFC 6455 §5.7: masked "Hello"
        let mut buf = *b"Hello";
        apply_mask(&mut buf, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(buf, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }
}
