//! One upstream TCP exchange per client request: connect, send the
//! request, accumulate the response, close. Mirrors the lifecycle of a
//! single blocking socket in the original design, rebuilt on
//! non-blocking tokio I/O with explicit timeouts standing in for
//! `EAGAIN`/`EWOULDBLOCK`.

use bytes::{Bytes, BytesMut};
use socket2::SockRef;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::error::{ProxyError, Result};
use crate::http;

const READ_CHUNK: usize = 1024;
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

pub struct UpstreamClient {
    stream: TcpStream,
}

/// Outcome of [`UpstreamClient::receive`]: either the full buffered
/// response, or a signal that a chunked body was streamed straight to
/// the client and must not be cached, logged as a response, or
/// forwarded again.
pub enum Received {
    Buffered(Bytes),
    StreamedChunked,
}

impl UpstreamClient {
    /// Connects to `host:port`, trying every resolved address in order
    /// and keeping the first that completes. Fails once every candidate
    /// has been tried.
    pub async fn connect(host: &str, port: &str) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = timeout(UPSTREAM_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| ProxyError::UpstreamConnect {
                host: host.to_string(),
                port: port.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            })?
            .map_err(|source| ProxyError::UpstreamConnect {
                host: host.to_string(),
                port: port.to_string(),
                source,
            })?;

        // tokio::net::TcpStream has no set_keepalive of its own; borrow it
        // as a socket2 socket just long enough to flip SO_KEEPALIVE.
        SockRef::from(&stream).set_keepalive(true).ok();

        Ok(Self { stream })
    }

    /// Unwraps the connected socket for callers (the Tunnel Forwarder)
    /// that need to drive both halves directly instead of going through
    /// [`UpstreamClient::receive`].
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }

    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(ProxyError::UpstreamIo)
    }

    /// Reads the response in 1024-byte chunks until `Content-Length` (if
    /// present) is satisfied, or until the peer closes, or until a read
    /// times out (treated as end of response, mirroring a blocking
    /// socket's `EAGAIN` on an idle keep-alive connection). If the
    /// completed response advertises `Transfer-Encoding: chunked`, the
    /// remaining bytes are piped verbatim to `client` and
    /// [`Received::StreamedChunked`] is returned instead of the buffer.
    pub async fn receive<W>(&mut self, client: &mut W) -> Result<Received>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        let mut buf = BytesMut::with_capacity(8192);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let read = match timeout(UPSTREAM_TIMEOUT, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(ProxyError::UpstreamIo(e)),
                Err(_) => break,
            };
            buf.extend_from_slice(&chunk[..read]);

            if !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                continue;
            }

            let headers = http::parse_headers(&buf);
            let chunked = http::header_value(&headers, "Transfer-Encoding")
                .unwrap_or("")
                .eq_ignore_ascii_case("chunked");
            if chunked {
                break;
            }

            let content_length = http::get_content_length(&buf);
            if content_length > 0 {
                let header_end = find_header_end(&buf);
                let body_len = buf.len().saturating_sub(header_end) as i64;
                if body_len >= content_length {
                    break;
                }
            } else if content_length == 0 {
                break;
            }
        }

        let response = buf.freeze();
        let headers = http::parse_headers(&response);
        let transfer_encoding = http::header_value(&headers, "Transfer-Encoding").unwrap_or("");

        if transfer_encoding.eq_ignore_ascii_case("chunked") {
            client
                .write_all(&response)
                .await
                .map_err(ProxyError::ClientIo)?;
            loop {
                let read = self
                    .stream
                    .read(&mut chunk)
                    .await
                    .map_err(ProxyError::UpstreamIo)?;
                if read == 0 {
                    break;
                }
                client
                    .write_all(&chunk[..read])
                    .await
                    .map_err(ProxyError::ClientIo)?;
            }
            return Ok(Received::StreamedChunked);
        }

        Ok(Received::Buffered(response))
    }
}

fn find_header_end(buf: &[u8]) -> usize {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
        .unwrap_or(buf.len())
}
