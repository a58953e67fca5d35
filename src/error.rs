//! Errors raised while framing, assembling or transporting WebSocket data.
//!
//! Every variant of [`Error`] is terminal for a [`Session`](crate::Session):
//! the session records it as the close cause and releases its stream.

use std::io;

/// Result alias used by the codec, assembler and session.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Close status codes sent when the local side fails the connection.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The transport failed or ended before a frame was complete.
    #[error("stream: {0}")]
    Stream(#[from] io::Error),
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("capacity exceeded: {0}")]
    Capacity(#[from] CapacityError),
}

impl Error {
    /// Status code to put in the Close frame when this error fails the
    /// connection. `None` when the stream itself is unusable.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Error::Stream(_) => None,
            Error::Protocol(ProtocolError::InvalidUtf8) => Some(close_code::INVALID_PAYLOAD),
            Error::Protocol(_) => Some(close_code::PROTOCOL_ERROR),
            Error::Capacity(_) => Some(close_code::MESSAGE_TOO_BIG),
        }
    }

    pub(crate) fn eof(mid_frame: bool) -> Self {
        let msg = if mid_frame {
            "stream ended mid-frame"
        } else {
            "stream ended before a close frame"
        };
        Error::Stream(io::Error::new(io::ErrorKind::UnexpectedEof, msg))
    }
}

/// Frame or message structure that RFC 6455 forbids.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),
    #[error("reserved bits set ({0:#04x}) without a negotiated extension")]
    ReservedBits(u8),
    #[error("64-bit payload length has its most significant bit set")]
    LengthOverflow,
    #[error("control frame is fragmented")]
    FragmentedControl,
    #[error("control frame payload of {0} bytes exceeds 125")]
    ControlTooLong(u64),
    #[error("continuation expected")]
    ContinuationExpected,
    #[error("continuation without start")]
    ContinuationWithoutStart,
    #[error("invalid utf-8 in text message")]
    InvalidUtf8,
}

/// A configured limit from [`SessionConfig`](crate::SessionConfig) was hit.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: u64 },
    #[error("message of {len} bytes exceeds the {max} byte limit")]
    MessageTooLarge { len: usize, max: usize },
    #[error("message spans more than {max} frames")]
    TooManyFragments { max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_codes_follow_error_kind() {
        assert_eq!(
            Error::from(ProtocolError::ContinuationExpected).close_code(),
            Some(1002)
        );
        assert_eq!(Error::from(ProtocolError::InvalidUtf8).close_code(), Some(1007));
        assert_eq!(
            Error::from(CapacityError::TooManyFragments { max: 4 }).close_code(),
            Some(1009)
        );
        assert_eq!(Error::eof(true).close_code(), None);
    }

    #[test]
    fn display_carries_details() {
        let err = Error::from(CapacityError::FrameTooLarge { len: 2048, max: 1024 });
        let msg = err.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));

        let err = Error::from(ProtocolError::UnknownOpcode(0x3));
        assert_eq!(err.to_string(), "protocol violation: unknown opcode 0x3");
    }

    #[test]
    fn eof_is_a_stream_error() {
        match Error::eof(false) {
            Error::Stream(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected {other:?}"),
        }
    }
}
