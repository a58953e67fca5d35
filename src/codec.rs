//! Frame codec: RFC 6455 header encoding, masking and incremental decoding.
//!
//! ```text
//!  0                   1                   2                   3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |   (16/64 bits if len==126/127)|
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Masking-key (32 bits), present iff MASK bit set           |
//! +---------------------------------------------------------------+
//! |                     Payload Data                              |
//! +---------------------------------------------------------------+
//! ```

use bytes::{Buf, BufMut, BytesMut};
use rand::RngCore;
use smallvec::SmallVec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CapacityError, Error, ProtocolError, Result};
use crate::frame::{Frame, MAX_CONTROL_PAYLOAD, OpCode, apply_mask};

const FIN: u8 = 0x80;
const RSV_MASK: u8 = 0x70;
const OPCODE_MASK: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LEN_MASK: u8 = 0x7F;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

/// 2 fixed bytes + 8 length bytes + 4 mask bytes.
pub const MAX_HEADER_LEN: usize = 14;

const READ_CHUNK: usize = 4096;

/// Encoded frame header, kept on the stack.
pub type Header = SmallVec<[u8; MAX_HEADER_LEN]>;

/// Encode a frame header using the shortest length form that fits.
pub fn encode_header(
    opcode: OpCode,
    payload_len: usize,
    fin: bool,
    mask: Option<[u8; 4]>,
) -> Header {
    let mut header = Header::new();
    header.push((if fin { FIN } else { 0 }) | opcode as u8);

    let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
    if payload_len <= 125 {
        header.push(mask_bit | payload_len as u8);
    } else if let Ok(len) = u16::try_from(payload_len) {
        header.push(mask_bit | LEN_16);
        header.extend_from_slice(&len.to_be_bytes());
    } else {
        header.push(mask_bit | LEN_64);
        header.extend_from_slice(&(payload_len as u64).to_be_bytes());
    }

    if let Some(key) = mask {
        header.extend_from_slice(&key);
    }
    header
}

/// Append one complete frame to `dst`, masking the payload when `mask` is set.
pub fn encode_frame(
    dst: &mut BytesMut,
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    mask: Option<[u8; 4]>,
) {
    let header = encode_header(opcode, payload.len(), fin, mask);
    dst.reserve(header.len() + payload.len());
    dst.put_slice(&header);

    let start = dst.len();
    dst.put_slice(payload);
    if let Some(key) = mask {
        apply_mask(&mut dst[start..], key);
    }
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` and leaves `src` untouched while the frame is
/// incomplete. Header violations are reported as soon as the header bytes
/// are available, before any payload is buffered. The declared length is
/// never used to size `src`; the buffer only grows with bytes that arrive.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: u64) -> Result<Option<Frame>> {
    if src.len() < 2 {
        return Ok(None);
    }
    let (b0, b1) = (src[0], src[1]);

    let rsv = b0 & RSV_MASK;
    if rsv != 0 {
        return Err(ProtocolError::ReservedBits(rsv).into());
    }
    let fin = b0 & FIN != 0;
    let opcode = OpCode::try_from(b0 & OPCODE_MASK)?;
    let masked = b1 & MASK_BIT != 0;

    let (len, mut offset) = match b1 & LEN_MASK {
        LEN_16 => {
            let Some(bytes) = src.get(2..4) else {
                return Ok(None);
            };
            (u64::from(u16::from_be_bytes([bytes[0], bytes[1]])), 4)
        }
        LEN_64 => {
            let Some(bytes) = src.get(2..10) else {
                return Ok(None);
            };
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            let len = u64::from_be_bytes(raw);
            if len & (1 << 63) != 0 {
                return Err(ProtocolError::LengthOverflow.into());
            }
            (len, 10)
        }
        n => (u64::from(n), 2),
    };

    if opcode.is_control() {
        if !fin {
            return Err(ProtocolError::FragmentedControl.into());
        }
        if len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(ProtocolError::ControlTooLong(len).into());
        }
    }
    if len > max_frame_size {
        return Err(CapacityError::FrameTooLarge {
            len,
            max: max_frame_size,
        }
        .into());
    }
    let len = usize::try_from(len).map_err(|_| CapacityError::FrameTooLarge {
        len,
        max: usize::MAX as u64,
    })?;

    let mask = if masked {
        let Some(bytes) = src.get(offset..offset + 4) else {
            return Ok(None);
        };
        let mut key = [0u8; 4];
        key.copy_from_slice(bytes);
        offset += 4;
        Some(key)
    } else {
        None
    };

    if src.len() - offset < len {
        return Ok(None);
    }

    src.advance(offset);
    let mut payload = src.split_to(len);
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Some(Frame {
        fin,
        opcode,
        masked,
        payload: payload.freeze(),
    }))
}

/// Read side of the codec: an owned buffer holding partial frames.
pub struct FrameReader {
    read_buf: BytesMut,
    max_frame_size: u64,
}

impl FrameReader {
    pub fn new(max_frame_size: u64) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            max_frame_size,
        }
    }

    /// Queue bytes that were read from the stream before the codec took over.
    pub fn prefill(&mut self, bytes: &[u8]) {
        self.read_buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Read exactly one frame, refilling the buffer across partial reads.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub async fn read_frame<S>(&mut self, stream: &mut S) -> Result<Frame>
    where
        S: AsyncRead + Unpin,
    {
        loop {
            if let Some(frame) = decode_frame(&mut self.read_buf, self.max_frame_size)? {
                tracing::trace!(
                    opcode = ?frame.opcode,
                    fin = frame.fin,
                    len = frame.payload.len(),
                    "frame received"
                );
                return Ok(frame);
            }

            if self.read_buf.capacity() == self.read_buf.len() {
                self.read_buf.reserve(READ_CHUNK);
            }
            if stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(Error::eof(!self.read_buf.is_empty()));
            }
        }
    }
}

/// Write side of the codec: a reusable encode buffer and the mask-key source.
pub struct FrameWriter<R> {
    write_buf: BytesMut,
    rng: R,
}

impl<R: RngCore> FrameWriter<R> {
    pub fn new(rng: R) -> Self {
        Self {
            write_buf: BytesMut::new(),
            rng,
        }
    }

    /// Write one frame and flush it. With `mask_required` a fresh key is
    /// drawn for this frame alone.
    pub async fn write_frame<S>(
        &mut self,
        stream: &mut S,
        opcode: OpCode,
        payload: &[u8],
        fin: bool,
        mask_required: bool,
    ) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let mask = mask_required.then(|| {
            let mut key = [0u8; 4];
            self.rng.fill_bytes(&mut key);
            key
        });

        self.write_buf.clear();
        encode_frame(&mut self.write_buf, opcode, payload, fin, mask);
        stream.write_all(&self.write_buf).await?;
        stream.flush().await?;

        tracing::trace!(?opcode, fin, len = payload.len(), "frame sent");
        Ok(())
    }
}
