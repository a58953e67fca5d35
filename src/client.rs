use anyhow::Result;
use core::pin::Pin;
use core::task::{Context, Poll};
use monoio::net::TcpStream;
use monoio_compat::{AsyncRead, AsyncWrite, StreamWrapper};

use crate::config::SessionConfig;
use crate::http_upgrade::{generate_client_key, read_response, write_request};
use crate::message::Message;
use crate::session::{Session, SessionReader, SessionWriter};
use crate::tls::{connect_wss, default_connector};
use crate::url::{Scheme, parse_ws_or_wss};

/// Plain TCP or TLS over TCP, both wrapped in `monoio_compat::StreamWrapper`
/// to provide AsyncRead/AsyncWrite.
#[allow(clippy::large_enum_variant)]
pub enum AnyStream {
    Plain(StreamWrapper<TcpStream>),
    Tls(StreamWrapper<monoio_rustls::ClientTlsStream<TcpStream>>),
}

macro_rules! dispatch {
    ($self:ident, $s:ident => $call:expr) => {
        match $self.get_mut() {
            AnyStream::Plain($s) => $call,
            AnyStream::Tls($s) => $call,
        }
    };
}

impl AsyncRead for AnyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        dispatch!(self, s => Pin::new(s).poll_read(cx, buf))
    }
}

impl AsyncWrite for AnyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        dispatch!(self, s => Pin::new(s).poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        dispatch!(self, s => Pin::new(s).poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        dispatch!(self, s => Pin::new(s).poll_shutdown(cx))
    }
}

/// Exposed stream type used by `WsClient`.
pub type WsStream = AnyStream;

pub struct WsClient {
    pub session: Session<WsStream>,
}

impl WsClient {
    /// Connect to a `ws://` or `wss://` URL and complete the WebSocket handshake.
    pub async fn connect(url: &str, extra_headers: &[(&str, &str)]) -> Result<Self> {
        Self::connect_with_config(url, extra_headers, SessionConfig::default()).await
    }

    pub async fn connect_with_config(
        url: &str,
        extra_headers: &[(&str, &str)],
        config: SessionConfig,
    ) -> Result<Self> {
        let u = parse_ws_or_wss(url)?;

        // Establish underlying transport (TCP or TLS over TCP)
        let mut stream = match u.scheme {
            Scheme::Ws => {
                let tcp = TcpStream::connect((u.host.as_str(), u.port)).await?;
                tcp.set_nodelay(true)?;
                AnyStream::Plain(StreamWrapper::new(tcp))
            }
            Scheme::Wss => {
                let tls = connect_wss(&u, default_connector()).await?;
                AnyStream::Tls(StreamWrapper::new(tls))
            }
        };

        // HTTP Upgrade handshake
        let key = generate_client_key(&mut rand::rng());
        write_request(
            &mut stream,
            &u.host_header(),
            &u.path_and_query,
            &key.sec_websocket_key,
            extra_headers,
        )
        .await?;
        let leftover = read_response(&mut stream, &key.expected_accept).await?;
        tracing::debug!(url, "websocket session open");

        let session = Session::with_config(stream, config).with_buffered(&leftover);
        Ok(Self { session })
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.session.recv().await
    }

    pub async fn send(&mut self, message: impl Into<Message>) {
        self.session.send(message).await;
    }

    pub async fn close(&mut self) {
        self.session.close().await;
    }

    /// Split into a reader and a writer that can run concurrently.
    pub fn split(self) -> (SessionReader<WsStream>, SessionWriter<WsStream>) {
        self.session.split()
    }

    pub fn into_inner(self) -> Session<WsStream> {
        self.session
    }
}
