//! Client side of the HTTP/1.1 Upgrade handshake that precedes framing.

use base64::{Engine as _, engine::general_purpose::STANDARD as b64};
use bytes::Bytes;
use httparse::Status;
use memchr::memmem::Finder;
use monoio_compat::{AsyncReadExt, AsyncWriteExt};
use rand::RngCore;
use sha1::{Digest, Sha1};
use smallvec::SmallVec;
use std::io::{Error as IoError, ErrorKind};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum UpgradeErr {
    #[error("eof during handshake")]
    Eof,
    #[error("oversized handshake")]
    Oversized,
    #[error("non-101 status line ({0:?})")]
    Status(Option<u16>),
    #[error("malformed response: {0}")]
    Parse(#[from] httparse::Error),
    #[error("missing upgrade headers")]
    Headers,
    #[error("bad Sec-WebSocket-Accept")]
    Accept,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

pub struct ClientKey {
    pub sec_websocket_key: String,
    pub expected_accept: String,
}

pub fn generate_client_key<R: RngCore + ?Sized>(rng: &mut R) -> ClientKey {
    let mut key_bytes = [0u8; 16];
    rng.fill_bytes(&mut key_bytes);
    let sec_websocket_key = b64.encode(key_bytes);
    let expected_accept = accept_key(&sec_websocket_key);

    ClientKey {
        sec_websocket_key,
        expected_accept,
    }
}

/// `Sec-WebSocket-Accept` value a server must answer `key` with.
pub fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    b64.encode(sha1.finalize())
}

/// Write the Upgrade request. An `Origin: http://<host>` header is added
/// unless `extra_headers` already carries one.
pub async fn write_request<S>(
    stream: &mut S,
    host_header: &str,
    path_and_query: &str,
    sec_websocket_key: &str,
    extra_headers: &[(&str, &str)],
) -> Result<(), UpgradeErr>
where
    S: AsyncWriteExt + Unpin,
{
    const REQUEST_PREFIX: &[u8] = b"GET ";
    const REQUEST_SUFFIX: &[u8] = b" HTTP/1.1\r\nHost: ";
    const UPGRADE_HEADERS: &[u8] = b"\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
        Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: ";
    const ORIGIN_PREFIX: &[u8] = b"Origin: http://";
    const HEADER_SEPARATOR: &[u8] = b": ";
    const CRLF: &[u8] = b"\r\n";

    let extra_headers_len: usize = extra_headers
        .iter()
        .map(|(k, v)| k.len() + HEADER_SEPARATOR.len() + v.len() + CRLF.len())
        .sum();
    let default_origin = !extra_headers
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case("origin"));
    let origin_len = if default_origin {
        ORIGIN_PREFIX.len() + host_header.len() + CRLF.len()
    } else {
        0
    };
    let total_len = REQUEST_PREFIX.len()
        + path_and_query.len()
        + REQUEST_SUFFIX.len()
        + host_header.len()
        + UPGRADE_HEADERS.len()
        + sec_websocket_key.len()
        + CRLF.len()
        + origin_len
        + extra_headers_len
        + CRLF.len();

    let mut buffer = SmallVec::<[u8; 512]>::new();
    buffer.try_reserve(total_len).map_err(|_| {
        UpgradeErr::Io(IoError::new(
            ErrorKind::OutOfMemory,
            "failed to reserve request buffer",
        ))
    })?;

    buffer.extend_from_slice(REQUEST_PREFIX);
    buffer.extend_from_slice(path_and_query.as_bytes());
    buffer.extend_from_slice(REQUEST_SUFFIX);
    buffer.extend_from_slice(host_header.as_bytes());
    buffer.extend_from_slice(UPGRADE_HEADERS);
    buffer.extend_from_slice(sec_websocket_key.as_bytes());
    buffer.extend_from_slice(CRLF);

    if default_origin {
        buffer.extend_from_slice(ORIGIN_PREFIX);
        buffer.extend_from_slice(host_header.as_bytes());
        buffer.extend_from_slice(CRLF);
    }

    for (k, v) in extra_headers {
        buffer.extend_from_slice(k.as_bytes());
        buffer.extend_from_slice(HEADER_SEPARATOR);
        buffer.extend_from_slice(v.as_bytes());
        buffer.extend_from_slice(CRLF);
    }

    buffer.extend_from_slice(CRLF);

    stream.write_all(&buffer).await?;
    stream.flush().await?;
    tracing::debug!(host = host_header, path = path_and_query, "upgrade request sent");
    Ok(())
}

/// Read and validate the `101 Switching Protocols` response.
///
/// Returns the bytes that followed the header block in the last read; they
/// already belong to the frame stream.
pub async fn read_response<S>(stream: &mut S, expected_accept: &str) -> Result<Bytes, UpgradeErr>
where
    S: AsyncReadExt + Unpin,
{
    let mut hdr = Vec::with_capacity(2048);
    let mut chunk = [0u8; 1024];
    let finder = Finder::new(b"\r\n\r\n");
    let mut scan_pos = 0;

    loop {
        if finder.find(&hdr[scan_pos..]).is_some() {
            break;
        }

        scan_pos = hdr.len().saturating_sub(3);

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(UpgradeErr::Eof);
        }

        hdr.extend_from_slice(&chunk[..n]);
        if hdr.len() > MAX_RESPONSE_HEAD {
            return Err(UpgradeErr::Oversized);
        }
    }

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    let head_len = match response.parse(&hdr)? {
        Status::Complete(len) => len,
        Status::Partial => return Err(UpgradeErr::Headers),
    };

    if response.code != Some(101) {
        return Err(UpgradeErr::Status(response.code));
    }

    let connection = find_header(response.headers, "Connection").ok_or(UpgradeErr::Headers)?;
    if !header_has_token(connection, "upgrade")? {
        return Err(UpgradeErr::Headers);
    }

    let upgrade = find_header(response.headers, "Upgrade").ok_or(UpgradeErr::Headers)?;
    if !value_eq_ascii(upgrade, "websocket")? {
        return Err(UpgradeErr::Headers);
    }

    let accept = find_header(response.headers, "Sec-WebSocket-Accept").ok_or(UpgradeErr::Headers)?;
    if std::str::from_utf8(accept)?.trim() != expected_accept {
        return Err(UpgradeErr::Accept);
    }

    let leftover = Bytes::copy_from_slice(&hdr[head_len..]);
    tracing::debug!(leftover = leftover.len(), "upgrade accepted");
    Ok(leftover)
}

fn find_header<'a>(headers: &'a [httparse::Header<'a>], name: &str) -> Option<&'a [u8]> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value)
}

fn value_eq_ascii(value: &[u8], token: &str) -> Result<bool, std::str::Utf8Error> {
    Ok(std::str::from_utf8(value)?.trim().eq_ignore_ascii_case(token))
}

fn header_has_token(value: &[u8], token: &str) -> Result<bool, std::str::Utf8Error> {
    let text = std::str::from_utf8(value)?;
    Ok(text
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token)))
}
