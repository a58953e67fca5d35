//! Session limits.

/// Limits applied by a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Largest payload accepted in a single incoming frame.
    pub max_frame_size: u64,
    /// Largest assembled incoming message.
    pub max_message_size: usize,
    /// Most frames one incoming message may span.
    pub max_fragments: usize,
    /// Outgoing payloads above this size are split into continuation frames.
    pub max_send_frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragments: 4096,
            max_send_frame_size: 1024 * 1024, // 1 MB
        }
    }
}

impl SessionConfig {
    pub fn with_max_frame_size(mut self, max: u64) -> Self {
        self.max_frame_size = max;
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn with_max_fragments(mut self, max: usize) -> Self {
        self.max_fragments = max;
        self
    }

    /// Zero is treated as one byte per frame.
    pub fn with_max_send_frame_size(mut self, max: usize) -> Self {
        self.max_send_frame_size = max;
        self
    }
}
