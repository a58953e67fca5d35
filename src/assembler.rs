//! Message assembly: folds data frames into messages and separates out
//! control frames.
//!
//! The assembler is a pure state machine. It performs no IO; the session
//! acts on the [`Step`] it returns (replying to pings, closing on close).

use bytes::{Bytes, BytesMut};

use crate::error::{CapacityError, ProtocolError, Result};
use crate::frame::{Frame, OpCode};
use crate::message::Message;

/// Outcome of feeding one frame to the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A complete message.
    Message(Message),
    /// A fragment was buffered; more frames are needed.
    Pending,
    /// Peer ping; answer with a pong carrying the same payload.
    Ping(Bytes),
    Pong(Bytes),
    /// Peer close with its raw payload (status code + reason, possibly empty).
    Close(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Binary,
}

#[derive(Debug)]
struct Partial {
    kind: Kind,
    buf: BytesMut,
    fragments: usize,
}

#[derive(Debug)]
pub struct Assembler {
    partial: Option<Partial>,
    max_message_size: usize,
    max_fragments: usize,
}

impl Assembler {
    pub fn new(max_message_size: usize, max_fragments: usize) -> Self {
        Self {
            partial: None,
            max_message_size,
            max_fragments,
        }
    }

    /// True while a fragmented message is being collected.
    pub fn is_assembling(&self) -> bool {
        self.partial.is_some()
    }

    pub fn push(&mut self, frame: Frame) -> Result<Step> {
        let Frame {
            fin,
            opcode,
            payload,
            ..
        } = frame;

        let kind = match opcode {
            OpCode::Ping => return Ok(Step::Ping(payload)),
            OpCode::Pong => return Ok(Step::Pong(payload)),
            OpCode::Close => {
                self.partial = None;
                return Ok(Step::Close(payload));
            }
            OpCode::Continuation => return self.continue_message(payload, fin),
            OpCode::Text => Kind::Text,
            OpCode::Binary => Kind::Binary,
        };

        if self.partial.is_some() {
            return Err(ProtocolError::ContinuationExpected.into());
        }
        self.check_size(payload.len())?;

        if fin {
            return finish(kind, payload).map(Step::Message);
        }

        let mut buf = BytesMut::with_capacity(payload.len());
        buf.extend_from_slice(&payload);
        self.partial = Some(Partial {
            kind,
            buf,
            fragments: 1,
        });
        Ok(Step::Pending)
    }

    fn continue_message(&mut self, payload: Bytes, fin: bool) -> Result<Step> {
        let Some(mut partial) = self.partial.take() else {
            return Err(ProtocolError::ContinuationWithoutStart.into());
        };
        if partial.fragments >= self.max_fragments {
            return Err(CapacityError::TooManyFragments {
                max: self.max_fragments,
            }
            .into());
        }
        self.check_size(partial.buf.len().saturating_add(payload.len()))?;

        partial.buf.extend_from_slice(&payload);
        partial.fragments += 1;
        if fin {
            return finish(partial.kind, partial.buf.freeze()).map(Step::Message);
        }
        self.partial = Some(partial);
        Ok(Step::Pending)
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_message_size {
            return Err(CapacityError::MessageTooLarge {
                len,
                max: self.max_message_size,
            }
            .into());
        }
        Ok(())
    }
}

fn finish(kind: Kind, payload: Bytes) -> Result<Message> {
    match kind {
        Kind::Binary => Ok(Message::Binary(payload)),
        Kind::Text => std::str::from_utf8(&payload)
            .map(|s| Message::Text(s.to_owned()))
            .map_err(|_| ProtocolError::InvalidUtf8.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn frame(opcode: OpCode, payload: &[u8], fin: bool) -> Frame {
        Frame::new(opcode, payload.to_vec(), fin)
    }

    fn assembler() -> Assembler {
        Assembler::new(1024, 8)
    }

    #[test]
    fn single_frame_messages() {
        let mut a = assembler();
        assert_eq!(
            a.push(frame(OpCode::Text, b"hi", true)).unwrap(),
            Step::Message(Message::text("hi"))
        );
        assert_eq!(
            a.push(frame(OpCode::Binary, &[1, 2], true)).unwrap(),
            Step::Message(Message::binary(vec![1u8, 2]))
        );
        assert!(!a.is_assembling());
    }

    #[test]
    fn reassembles_fragments() {
        let mut a = assembler();
        assert_eq!(a.push(frame(OpCode::Text, b"he", false)).unwrap(), Step::Pending);
        assert!(a.is_assembling());
        assert_eq!(
            a.push(frame(OpCode::Continuation, b"ll", false)).unwrap(),
            Step::Pending
        );
        assert_eq!(
            a.push(frame(OpCode::Continuation, b"o", true)).unwrap(),
            Step::Message(Message::text("hello"))
        );
        assert!(!a.is_assembling());
    }

    #[test]
    fn control_frames_do_not_disturb_assembly() {
        let mut a = assembler();
        a.push(frame(OpCode::Binary, b"ab", false)).unwrap();
        assert_eq!(
            a.push(frame(OpCode::Ping, b"abc", true)).unwrap(),
            Step::Ping(Bytes::from_static(b"abc"))
        );
        assert_eq!(
            a.push(frame(OpCode::Pong, b"", true)).unwrap(),
            Step::Pong(Bytes::new())
        );
        assert_eq!(
            a.push(frame(OpCode::Continuation, b"cd", true)).unwrap(),
            Step::Message(Message::binary(&b"abcd"[..]))
        );
    }

    #[test]
    fn continuation_without_start() {
        let err = assembler()
            .push(frame(OpCode::Continuation, b"x", true))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ContinuationWithoutStart)
        ));
    }

    #[test]
    fn new_message_while_assembling() {
        let mut a = assembler();
        a.push(frame(OpCode::Text, b"a", false)).unwrap();
        let err = a.push(frame(OpCode::Binary, b"b", true)).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ContinuationExpected)
        ));
    }

    #[test]
    fn invalid_utf8_in_text() {
        let err = assembler()
            .push(frame(OpCode::Text, &[0xff, 0xfe], true))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn utf8_split_across_fragments_is_accepted() {
        let bytes = "€".as_bytes();
        let mut a = assembler();
        a.push(frame(OpCode::Text, &bytes[..1], false)).unwrap();
        assert_eq!(
            a.push(frame(OpCode::Continuation, &bytes[1..], true)).unwrap(),
            Step::Message(Message::text("€"))
        );
    }

    #[test]
    fn message_size_limit() {
        let mut a = Assembler::new(4, 8);
        a.push(frame(OpCode::Binary, b"abc", false)).unwrap();
        let err = a.push(frame(OpCode::Continuation, b"de", true)).unwrap_err();
        assert!(matches!(
            err,
            Error::Capacity(CapacityError::MessageTooLarge { len: 5, max: 4 })
        ));

        let err = Assembler::new(4, 8)
            .push(frame(OpCode::Binary, b"abcde", true))
            .unwrap_err();
        assert!(matches!(err, Error::Capacity(_)));
    }

    #[test]
    fn fragment_count_limit() {
        let mut a = Assembler::new(1024, 2);
        a.push(frame(OpCode::Binary, b"a", false)).unwrap();
        a.push(frame(OpCode::Continuation, b"b", false)).unwrap();
        let err = a.push(frame(OpCode::Continuation, b"c", true)).unwrap_err();
        assert!(matches!(
            err,
            Error::Capacity(CapacityError::TooManyFragments { max: 2 })
        ));
    }

    #[test]
    fn close_drops_partial_message() {
        let mut a = assembler();
        a.push(frame(OpCode::Text, b"par", false)).unwrap();
        assert_eq!(
            a.push(frame(OpCode::Close, &[0x03, 0xe8], true)).unwrap(),
            Step::Close(Bytes::from_static(&[0x03, 0xe8]))
        );
        assert!(!a.is_assembling());
    }
}
