//! The session controller: public `send`/`recv` over an upgraded stream,
//! and the open/closed lifecycle.
//!
//! A session exclusively owns its stream. Every path that ends the session
//! (peer close, local close, decode or protocol failure, IO failure) takes
//! the write half out, shuts it down and drops it; the read half is dropped
//! the next time the reading side looks. Once closed, `recv` returns `None`
//! immediately and `send` does nothing.
//!
//! [`Session::split`] hands out a [`SessionReader`] and a [`SessionWriter`]
//! so one task can wait in `recv` while another sends. Both halves write
//! through the same outbound state: the reader's Pong and Close replies are
//! serialized with the writer's frames, never interleaved mid-frame. The
//! halves share state through `Rc`, matching monoio's thread-per-core model.

use std::cell::OnceCell;
use std::io;
use std::rc::Rc;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::assembler::{Assembler, Step};
use crate::codec::{FrameReader, FrameWriter};
use crate::config::SessionConfig;
use crate::error::{Error, ProtocolError, Result, close_code};
use crate::frame::{MAX_CONTROL_PAYLOAD, OpCode};
use crate::message::Message;

/// Why a session stopped.
#[derive(Debug)]
pub enum CloseCause {
    /// The peer sent a Close frame; holds its raw payload.
    Peer(Bytes),
    /// [`Session::close`] or [`Session::close_with`] was called.
    Local,
    Failed(Error),
}

impl CloseCause {
    /// Status code carried by a peer Close frame.
    pub fn peer_code(&self) -> Option<u16> {
        match self {
            CloseCause::Peer(p) if p.len() >= 2 => Some(u16::from_be_bytes([p[0], p[1]])),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            CloseCause::Failed(e) => Some(e),
            _ => None,
        }
    }
}

fn cancelled_write() -> Error {
    io::Error::new(io::ErrorKind::Interrupted, "write cancelled mid-frame").into()
}

/// Everything that touches the write half.
struct Outbound<S, R> {
    stream: Option<WriteHalf<S>>,
    codec: FrameWriter<R>,
    // Set while a frame is being written. Still set on entry means the last
    // write was cancelled or failed and the stream sits mid-frame.
    write_in_flight: bool,
}

impl<S: AsyncWrite, R: RngCore> Outbound<S, R> {
    fn is_poisoned(&self) -> bool {
        self.write_in_flight && self.stream.is_some()
    }

    async fn write(&mut self, opcode: OpCode, payload: &[u8], fin: bool) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        self.write_in_flight = true;
        self.codec
            .write_frame(stream, opcode, payload, fin, true)
            .await?;
        self.write_in_flight = false;
        Ok(())
    }
}

/// State both halves of a session see.
struct Shared<S, R> {
    config: SessionConfig,
    cause: OnceCell<CloseCause>,
    out: Mutex<Outbound<S, R>>,
}

impl<S: AsyncWrite, R: RngCore> Shared<S, R> {
    fn is_open(&self) -> bool {
        self.cause.get().is_none()
    }

    async fn write_frame(&self, opcode: OpCode, payload: &[u8], fin: bool) -> Result<()> {
        let mut out = self.out.lock().await;
        if out.is_poisoned() {
            return Err(cancelled_write());
        }
        out.write(opcode, payload, fin).await
    }

    async fn check_poisoned(&self) {
        let poisoned = self.out.lock().await.is_poisoned();
        if poisoned {
            self.fail(cancelled_write()).await;
        }
    }

    async fn close(&self, payload: &[u8]) {
        let mut out = self.out.lock().await;
        if out.stream.is_none() {
            return;
        }
        let sent = if out.is_poisoned() {
            Err(cancelled_write())
        } else {
            out.write(OpCode::Close, payload, true).await
        };
        match sent {
            Ok(()) => self.release(&mut out, CloseCause::Local).await,
            Err(e) => {
                tracing::warn!(error = %e, "close failed");
                self.release(&mut out, CloseCause::Failed(e)).await;
            }
        }
    }

    async fn answer_close(&self, payload: Bytes) {
        let mut out = self.out.lock().await;
        tracing::debug!(len = payload.len(), "peer closed");
        // Echo the status code only.
        let echo = payload.get(..2).unwrap_or(&[]);
        if !out.is_poisoned()
            && let Err(e) = out.write(OpCode::Close, echo, true).await
        {
            tracing::debug!(error = %e, "close echo failed");
        }
        self.release(&mut out, CloseCause::Peer(payload)).await;
    }

    /// Fail the connection: best-effort Close with a matching status code,
    /// then release the stream.
    async fn fail(&self, err: Error) {
        let mut out = self.out.lock().await;
        if out.stream.is_none() {
            return;
        }
        tracing::warn!(error = %err, "closing session");
        if !out.write_in_flight
            && let Some(code) = err.close_code()
            && let Err(e) = out.write(OpCode::Close, &code.to_be_bytes(), true).await
        {
            tracing::debug!(error = %e, "close frame not sent");
        }
        self.release(&mut out, CloseCause::Failed(err)).await;
    }

    async fn release(&self, out: &mut Outbound<S, R>, cause: CloseCause) {
        let Some(mut stream) = out.stream.take() else {
            return;
        };
        tracing::debug!(?cause, "session closed");
        let _ = self.cause.set(cause);
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(error = %e, "stream shutdown failed");
        }
    }
}

/// Receiving half of a [`Session`].
pub struct SessionReader<S, R = StdRng> {
    stream: Option<ReadHalf<S>>,
    codec: FrameReader,
    assembler: Assembler,
    shared: Rc<Shared<S, R>>,
}

impl<S, R> SessionReader<S, R>
where
    S: AsyncRead + AsyncWrite,
    R: RngCore,
{
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// `None` while open.
    pub fn close_cause(&self) -> Option<&CloseCause> {
        self.shared.cause.get()
    }

    /// Wait for the next complete message.
    ///
    /// Pings are answered and pongs dropped along the way. Returns `None`
    /// once the session is closed, for whatever reason, including a close
    /// issued by the writing half while this call was waiting.
    pub async fn recv(&mut self) -> Option<Message> {
        self.shared.check_poisoned().await;

        loop {
            if !self.shared.is_open() {
                self.stream = None;
                return None;
            }
            let stream = self.stream.as_mut()?;
            let step = match self.codec.read_frame(stream).await {
                Ok(frame) => self.assembler.push(frame),
                Err(e) => Err(e),
            };
            if !self.shared.is_open() {
                continue;
            }

            match step {
                Ok(Step::Message(message)) => return Some(message),
                Ok(Step::Pending) => {}
                Ok(Step::Pong(payload)) => {
                    tracing::trace!(len = payload.len(), "pong ignored");
                }
                Ok(Step::Ping(payload)) => {
                    if let Err(e) = self.shared.write_frame(OpCode::Pong, &payload, true).await {
                        self.shared.fail(e).await;
                    }
                }
                Ok(Step::Close(payload)) => self.shared.answer_close(payload).await,
                Err(e) => self.shared.fail(e).await,
            }
        }
    }

    fn drop_if_closed(&mut self) {
        if !self.shared.is_open() {
            self.stream = None;
        }
    }
}

/// Sending half of a [`Session`].
pub struct SessionWriter<S, R = StdRng> {
    shared: Rc<Shared<S, R>>,
}

impl<S, R> SessionWriter<S, R>
where
    S: AsyncWrite,
    R: RngCore,
{
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    pub fn close_cause(&self) -> Option<&CloseCause> {
        self.shared.cause.get()
    }

    /// Send a message, split into frames of at most
    /// `max_send_frame_size` bytes. Does nothing on a closed session; a
    /// write failure closes it.
    pub async fn send(&mut self, message: impl Into<Message>) {
        if !self.shared.is_open() {
            tracing::trace!("send on closed session dropped");
            return;
        }

        let (mut opcode, payload) = message.into().into_frame_parts();
        let max = self.shared.config.max_send_frame_size.max(1);
        let mut offset: usize = 0;
        loop {
            let end = payload.len().min(offset.saturating_add(max));
            let fin = end == payload.len();
            let sent = self
                .shared
                .write_frame(opcode, &payload[offset..end], fin)
                .await;
            if let Err(e) = sent {
                self.shared.fail(e).await;
                return;
            }
            if fin || !self.shared.is_open() {
                return;
            }
            offset = end;
            opcode = OpCode::Continuation;
        }
    }

    /// Send a Ping. Payloads over 125 bytes are rejected without touching
    /// the session.
    pub async fn ping(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(ProtocolError::ControlTooLong(payload.len() as u64).into());
        }
        if let Err(e) = self.shared.write_frame(OpCode::Ping, payload, true).await {
            self.shared.fail(e).await;
        }
        Ok(())
    }

    /// Close with status 1000.
    pub async fn close(&mut self) {
        self.shared.close(&close_code::NORMAL.to_be_bytes()).await;
    }

    /// Close with a status code and a reason of at most 123 bytes.
    pub async fn close_with(&mut self, code: u16, reason: &str) -> Result<()> {
        let len = 2 + reason.len();
        if len > MAX_CONTROL_PAYLOAD {
            return Err(ProtocolError::ControlTooLong(len as u64).into());
        }
        let mut payload = Vec::with_capacity(len);
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        self.shared.close(&payload).await;
        Ok(())
    }
}

/// A WebSocket session over one upgraded stream.
pub struct Session<S, R = StdRng> {
    reader: SessionReader<S, R>,
    writer: SessionWriter<S, R>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, SessionConfig::default())
    }

    pub fn with_config(stream: S, config: SessionConfig) -> Self {
        Self::with_rng(stream, config, StdRng::from_os_rng())
    }
}

impl<S, R> Session<S, R>
where
    S: AsyncRead + AsyncWrite,
    R: RngCore,
{
    /// Build a session drawing mask keys from `rng`.
    pub fn with_rng(stream: S, config: SessionConfig, rng: R) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Rc::new(Shared {
            config,
            cause: OnceCell::new(),
            out: Mutex::new(Outbound {
                stream: Some(write_half),
                codec: FrameWriter::new(rng),
                write_in_flight: false,
            }),
        });
        Self {
            reader: SessionReader {
                stream: Some(read_half),
                codec: FrameReader::new(config.max_frame_size),
                assembler: Assembler::new(config.max_message_size, config.max_fragments),
                shared: Rc::clone(&shared),
            },
            writer: SessionWriter { shared },
        }
    }

    /// Seed the read side with bytes that arrived together with the
    /// handshake response.
    pub fn with_buffered(mut self, bytes: &[u8]) -> Self {
        self.reader.codec.prefill(bytes);
        self
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_open()
    }

    /// `None` while open.
    pub fn close_cause(&self) -> Option<&CloseCause> {
        self.writer.close_cause()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.writer.shared.config
    }

    /// Split into halves that can wait in `recv` and `send` at the same time.
    pub fn split(self) -> (SessionReader<S, R>, SessionWriter<S, R>) {
        (self.reader, self.writer)
    }

    /// See [`SessionReader::recv`].
    pub async fn recv(&mut self) -> Option<Message> {
        self.reader.recv().await
    }

    /// See [`SessionWriter::send`].
    pub async fn send(&mut self, message: impl Into<Message>) {
        self.writer.send(message).await;
        self.reader.drop_if_closed();
    }

    pub async fn ping(&mut self, payload: &[u8]) -> Result<()> {
        let result = self.writer.ping(payload).await;
        self.reader.drop_if_closed();
        result
    }

    pub async fn close(&mut self) {
        self.writer.close().await;
        self.reader.drop_if_closed();
    }

    pub async fn close_with(&mut self, code: u16, reason: &str) -> Result<()> {
        let result = self.writer.close_with(code, reason).await;
        self.reader.drop_if_closed();
        result
    }
}
