use bytes::Bytes;

use crate::frame::OpCode;

/// An application message, assembled from one or more data frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl Message {
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Message::Binary(data.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            Message::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(s) => s.as_bytes(),
            Message::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opcode of the first frame and the wire payload.
    pub(crate) fn into_frame_parts(self) -> (OpCode, Bytes) {
        match self {
            Message::Text(s) => (OpCode::Text, Bytes::from(s)),
            Message::Binary(b) => (OpCode::Binary, b),
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(s)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Message::Binary(v.into())
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Message::Binary(b)
    }
}
