//! Per-connection request lifecycle: read one request, classify its
//! method, and run the matching state machine. One engine invocation
//! handles exactly one accepted socket, start to finish.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::cache::Cache;
use crate::http;
use crate::id;
use crate::logger::RequestLogger;
use crate::upstream::{Received, UpstreamClient};

/// Bound on the initial request read. The original single capped `recv`
/// truncated oversized requests silently; here an oversized request is
/// rejected outright rather than processed on a truncated buffer.
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

const TUNNEL_CHUNK: usize = 1024;

pub async fn handle_connection(
    mut client: TcpStream,
    peer_ip: String,
    cache: Arc<Cache>,
    logger: Arc<RequestLogger>,
) {
    let id = id::generate_request_id();

    let request = match read_request(&mut client).await {
        ReadOutcome::Request(bytes) => bytes,
        ReadOutcome::Empty => return,
        ReadOutcome::TooLarge => {
            let _ = client
                .write_all(http::make_error_response(413, "Request Entity Too Large").as_bytes())
                .await;
            return;
        }
        ReadOutcome::Closed => return,
    };

    logger.request(&id, &peer_ip, &request).await;

    let method = match http::extract_http_method(&request) {
        Ok(method) => method,
        Err(_) => {
            let _ = client
                .write_all(http::make_error_response(400, "Bad Request").as_bytes())
                .await;
            return;
        }
    };

    let (host, port) = match http::extract_host_and_port(&request) {
        Ok(pair) => pair,
        Err(_) => {
            let _ = client
                .write_all(http::make_error_response(400, "Bad Request").as_bytes())
                .await;
            return;
        }
    };

    match method.as_str() {
        "CONNECT" => handle_connect(client, &id, &host, &port, &logger).await,
        "GET" => handle_get(client, &id, &request, &host, &port, &cache, &logger).await,
        "POST" => handle_post(client, &id, &request, &host, &port, &logger).await,
        _ => {
            let _ = client
                .write_all(http::make_error_response(400, "Bad Request").as_bytes())
                .await;
        }
    }
}

enum ReadOutcome {
    Request(BytesMut),
    Empty,
    TooLarge,
    Closed,
}

/// Reads from `client` until the header terminator appears, then — if
/// `Content-Length` names a body — keeps reading until that many body
/// bytes have arrived, since a client is free to write headers and body
/// in separate `write()` calls. Refuses to grow the buffer past
/// [`MAX_REQUEST_SIZE`] in either phase.
async fn read_request(client: &mut TcpStream) -> ReadOutcome {
    let mut buf = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = match client.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => return ReadOutcome::Closed,
        };
        buf.extend_from_slice(&chunk[..n]);

        if buf.len() > MAX_REQUEST_SIZE {
            return ReadOutcome::TooLarge;
        }
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    if buf.is_empty() {
        return ReadOutcome::Empty;
    }

    let content_length = http::get_content_length(&buf);
    if content_length > 0 {
        let header_end = buf
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|pos| pos + 4)
            .unwrap_or(buf.len());

        while (buf.len() - header_end) < content_length as usize {
            let n = match client.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => return ReadOutcome::Closed,
            };
            buf.extend_from_slice(&chunk[..n]);

            if buf.len() > MAX_REQUEST_SIZE {
                return ReadOutcome::TooLarge;
            }
        }
    }

    ReadOutcome::Request(buf)
}

async fn handle_connect(mut client: TcpStream, id: &str, host: &str, port: &str, logger: &RequestLogger) {
    let upstream = match UpstreamClient::connect(host, port).await {
        Ok(upstream) => upstream,
        Err(e) => {
            logger.error(&format!("{id}: CONNECT to {host}:{port} failed: {e}")).await;
            let _ = client
                .write_all(http::make_error_response(502, "Bad Gateway").as_bytes())
                .await;
            return;
        }
    };

    if client
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await
        .is_err()
    {
        return;
    }

    tunnel(client, upstream, id, logger).await;
}

async fn handle_post(
    mut client: TcpStream,
    id: &str,
    request: &BytesMut,
    host: &str,
    port: &str,
    logger: &RequestLogger,
) {
    if http::get_content_length(request) < 0 {
        let _ = client
            .write_all(http::make_error_response(411, "Length Required").as_bytes())
            .await;
        return;
    }

    match fetch(&mut client, host, port, request, id, logger).await {
        Ok(Received::Buffered(response)) => {
            logger.received_response(id, host, &response).await;
            if client.write_all(&response).await.is_ok() {
                logger.responding(id, &response).await;
            }
        }
        Ok(Received::StreamedChunked) => {}
        Err(_) => {
            let _ = client
                .write_all(http::make_error_response(503, "Service Unavailable").as_bytes())
                .await;
        }
    }
}

/// Connects to `host:port`, logs the forward, sends `request`, and reads
/// the response back through `client` — the shared tail of every
/// GET/POST upstream exchange, differing only in how each caller
/// interprets the outcome.
async fn fetch(
    client: &mut TcpStream,
    host: &str,
    port: &str,
    request: &[u8],
    id: &str,
    logger: &RequestLogger,
) -> crate::error::Result<Received> {
    let mut upstream = UpstreamClient::connect(host, port).await?;
    logger.forward_request(id, request, host).await;
    upstream.send(request).await?;
    upstream.receive(client).await
}

async fn handle_get(
    mut client: TcpStream,
    id: &str,
    request: &BytesMut,
    host: &str,
    port: &str,
    cache: &Cache,
    logger: &RequestLogger,
) {
    let Some(entry) = cache.get(host).await else {
        logger.not_in_cache(id).await;
        serve_miss(&mut client, id, request, host, port, cache, logger).await;
        return;
    };

    logger.cache_status(id, &entry).await;

    if entry.must_revalidate || entry.no_cache {
        serve_revalidate(&mut client, id, request, host, port, &entry, cache, logger).await;
    } else if entry.is_fresh() {
        let _ = client.write_all(&entry.response).await;
        logger.responding(id, &entry.response).await;
    } else {
        serve_refresh(&mut client, id, request, host, port, &entry, cache, logger).await;
    }
}

async fn serve_miss(
    client: &mut TcpStream,
    id: &str,
    request: &BytesMut,
    host: &str,
    port: &str,
    cache: &Cache,
    logger: &RequestLogger,
) {
    match fetch(client, host, port, request, id, logger).await {
        Ok(Received::Buffered(response)) => {
            logger.received_response(id, host, &response).await;
            if http::has_no_store(&response) {
                logger.no_store(id).await;
            } else {
                let entry = cache.insert(id, host, response.clone(), logger).await;
                logger.cache_result(id, &entry).await;
            }
            if client.write_all(&response).await.is_ok() {
                logger.responding(id, &response).await;
            }
        }
        Ok(Received::StreamedChunked) => {}
        Err(_) => {
            let _ = client
                .write_all(http::make_error_response(503, "Service Unavailable").as_bytes())
                .await;
        }
    }
}

async fn serve_revalidate(
    client: &mut TcpStream,
    id: &str,
    request: &BytesMut,
    host: &str,
    port: &str,
    entry: &crate::cache::CacheEntry,
    cache: &Cache,
    logger: &RequestLogger,
) {
    let mut conditional = String::from_utf8_lossy(request).into_owned();
    http::make_revalidate_request(&mut conditional, &entry.response);

    let outcome = fetch(client, host, port, conditional.as_bytes(), id, logger).await;

    match outcome {
        Ok(Received::Buffered(response)) => {
            logger.received_response(id, host, &response).await;
            if http::get_status_code(&response) == 200 {
                if http::has_no_store(&response) {
                    logger.no_store(id).await;
                } else {
                    let updated = cache.insert(id, host, response.clone(), logger).await;
                    logger.cache_result(id, &updated).await;
                }
                if client.write_all(&response).await.is_ok() {
                    logger.responding(id, &response).await;
                }
            } else if client.write_all(&entry.response).await.is_ok() {
                logger.responding(id, &entry.response).await;
            }
        }
        Ok(Received::StreamedChunked) => {}
        Err(_) => {
            if client.write_all(&entry.response).await.is_ok() {
                logger.responding(id, &entry.response).await;
            }
        }
    }
}

async fn serve_refresh(
    client: &mut TcpStream,
    id: &str,
    request: &BytesMut,
    host: &str,
    port: &str,
    entry: &crate::cache::CacheEntry,
    cache: &Cache,
    logger: &RequestLogger,
) {
    let outcome = fetch(client, host, port, request, id, logger).await;

    match outcome {
        Ok(Received::Buffered(response)) => {
            logger.received_response(id, host, &response).await;
            if http::has_no_store(&response) {
                logger.no_store(id).await;
            } else {
                let updated = cache.insert(id, host, response.clone(), logger).await;
                logger.cache_result(id, &updated).await;
            }
            if client.write_all(&response).await.is_ok() {
                logger.responding(id, &response).await;
            }
        }
        Ok(Received::StreamedChunked) => {}
        Err(_) => {
            if client.write_all(&entry.response).await.is_ok() {
                logger.responding(id, &entry.response).await;
            }
        }
    }
}

/// Bidirectional byte pump for CONNECT: `select` over both sockets,
/// reading up to 1024 bytes and writing the full chunk to the peer
/// before returning to `select`. Either side closing (a zero-length
/// read) or a write failure ends the tunnel.
async fn tunnel(mut client: TcpStream, upstream: UpstreamClient, id: &str, logger: &RequestLogger) {
    let mut upstream = upstream.into_inner();
    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.split();

    let mut client_buf = [0u8; TUNNEL_CHUNK];
    let mut upstream_buf = [0u8; TUNNEL_CHUNK];

    loop {
        tokio::select! {
            result = client_read.read(&mut client_buf) => {
                match result {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if upstream_write.write_all(&client_buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            result = upstream_read.read(&mut upstream_buf) => {
                match result {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if client_write.write_all(&upstream_buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    logger.tunnel_closed(id).await;
}
