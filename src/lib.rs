//! # monoio-ws-session
//!
//! RFC 6455 WebSocket client framing for the [`monoio`] async runtime.
//!
//! The crate turns an upgraded duplex byte stream into a sequence of
//! application [`Message`]s and back:
//!
//! - [`codec`]: frame header encoding/decoding, masking, incremental reads.
//! - [`assembler`]: folds fragments into messages and separates control frames.
//! - [`Session`]: public `send`/`recv`, ping/pong/close handling and the
//!   closed-session lifecycle.
//!
//! [`Session`] is generic over any `AsyncRead + AsyncWrite` stream, so
//! the protocol core runs on any executor. [`WsClient`] adds TCP/TLS
//! connection setup and the HTTP Upgrade handshake on monoio.
//!
//! ## Basic Example
//!
//! ```no_run
//! use monoio_ws_session::{Message, WsClient};
//!
//! #[monoio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut client = WsClient::connect("wss://echo.websocket.org/", &[]).await?;
//!
//!     client.send("Hello, WebSocket!").await;
//!
//!     while let Some(message) = client.recv().await {
//!         match message {
//!             Message::Text(text) => println!("Received: {text}"),
//!             Message::Binary(bytes) => println!("Binary ({} bytes)", bytes.len()),
//!         }
//!     }
//!
//!     if let Some(cause) = client.session.close_cause() {
//!         println!("closed: {cause:?}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Closed sessions
//!
//! A received Close frame, any protocol violation, a stream failure, or an
//! explicit [`Session::close`] ends the session. From then on `recv` returns
//! `None` without blocking and `send` is a no-op; the reason is available
//! from [`Session::close_cause`].
//!
//! ## Reading and writing concurrently
//!
//! [`Session::split`] returns a [`SessionReader`] and a [`SessionWriter`].
//! One task can wait in `recv` while another sends; pong replies and close
//! echoes from the reader go through the same writer state.
//!
//! [`monoio`]: https://docs.rs/monoio

pub mod assembler;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod http_upgrade;
pub mod message;
pub mod session;
pub mod tls;
pub mod url;

pub use client::{WsClient, WsStream};
pub use config::SessionConfig;
pub use error::{CapacityError, Error, ProtocolError};
pub use frame::{Frame, OpCode};
pub use message::Message;
pub use session::{CloseCause, Session, SessionReader, SessionWriter};
