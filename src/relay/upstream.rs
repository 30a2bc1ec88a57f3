//! Upstream forwarding and response streaming.

use crate::http::client::{self, Origin};
use crate::http::request::Request;
use crate::http::response::{set_header, Headers, Response};
use crate::http::writer::{self, ResponseWriter};
use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Per-read chunk size. Small on purpose: each read is flushed to the client
/// immediately, which keeps latency minimal for token-by-token upstreams at
/// the cost of per-chunk overhead.
const DEFAULT_CHUNK_SIZE: usize = 32;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a chunk-size or trailer line in a chunked upstream body.
const MAX_CHUNK_LINE: usize = 8192;

/// Forwards a single inbound request to the fixed upstream origin and
/// streams the response back to the client.
///
/// Holds no per-request state; one instance is shared by every connection.
pub struct Relay {
    origin: Origin,
    chunk_size: usize,
    connect_timeout: Duration,
}

impl Relay {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Relays `request` to the upstream and streams the response to `client`.
    ///
    /// Failures before any byte reaches the client produce a 500 carrying the
    /// error text (and return `Ok`, the connection stays usable). Once the
    /// response head is committed, a failure terminates the stream without
    /// the zero chunk and the error propagates so the caller closes the
    /// connection — the client must not mistake a truncated body for a
    /// complete one.
    pub async fn forward(&self, request: &Request, client: &mut TcpStream) -> Result<()> {
        tracing::info!(method = request.method.as_str(), path = %request.path, "relaying request");

        let outbound = self.build_upstream_request(request);

        let mut upstream = match self.dispatch(&outbound).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(path = %request.path, error = %e, "upstream dispatch failed");
                return respond_error(client, &e).await;
            }
        };

        let mut buf = BytesMut::with_capacity(self.chunk_size.max(1024));
        let head = match client::read_response_head(&mut upstream, &mut buf).await {
            Ok(head) => head,
            Err(e) => {
                tracing::warn!(path = %request.path, error = %e, "failed to read upstream response head");
                return respond_error(client, &e).await;
            }
        };

        // The upstream's own framing decides how its body ends; the socket
        // stays open on keep-alive, so EOF alone is not a terminator.
        let chunked = head
            .header("Transfer-Encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);
        let content_length = head
            .header("Content-Length")
            .and_then(|v| v.parse::<usize>().ok());
        let status = head.status;

        // Commit the status line and the complete header set in one write.
        // Nothing may be added after this point.
        let headers = streaming_headers(head.headers);
        client
            .write_all(&writer::serialize_head(status, &headers))
            .await?;
        client.flush().await?;

        if chunked {
            self.relay_chunked_body(&mut upstream, &mut buf, client)
                .await?;
        } else if let Some(length) = content_length {
            self.relay_sized_body(&mut upstream, &mut buf, client, length)
                .await?;
        } else {
            self.relay_unsized_body(&mut upstream, &mut buf, client)
                .await?;
        }

        writer::write_final_chunk(client).await?;
        tracing::debug!(path = %request.path, status = status.as_u16(), "relay complete");
        Ok(())
    }

    /// Builds the outbound request: inbound method and path against the
    /// upstream origin, all inbound headers copied verbatim, then the
    /// relay's overrides applied on top.
    ///
    /// Public so tests can assert on the exact bytes sent upstream.
    pub fn build_upstream_request(&self, request: &Request) -> Vec<u8> {
        // Host and Content-Length are rewritten for the upstream; everything
        // else passes through untouched before the overrides land.
        let mut headers: Headers = request
            .headers
            .iter()
            .filter(|(k, _)| {
                !k.eq_ignore_ascii_case("Host") && !k.eq_ignore_ascii_case("Content-Length")
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        set_header(&mut headers, "Content-Type", "application/json");
        set_header(&mut headers, "Connection", "keep-alive");
        set_header(&mut headers, "Keep-Alive", "timeout=360");

        let borrowed: Vec<(&str, &str)> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        client::build_request(
            &request.method,
            &request.path,
            &self.origin.host_header(),
            &borrowed,
            &request.body,
        )
    }

    async fn dispatch(&self, outbound: &[u8]) -> Result<TcpStream> {
        let mut stream = timeout(self.connect_timeout, self.origin.connect())
            .await
            .context("upstream connect timed out")??;
        stream.write_all(outbound).await?;
        stream.flush().await?;
        Ok(stream)
    }

    /// Relays exactly `length` body bytes, then stops — the upstream may
    /// hold the connection open for its next request.
    async fn relay_sized_body(
        &self,
        upstream: &mut TcpStream,
        buf: &mut BytesMut,
        client: &mut TcpStream,
        length: usize,
    ) -> Result<()> {
        let mut remaining = length;
        while remaining > 0 {
            if buf.is_empty() {
                let n = upstream.read_buf(buf).await?;
                if n == 0 {
                    anyhow::bail!("upstream closed before sending the advertised body length");
                }
            }
            let take = buf.len().min(remaining).min(self.chunk_size);
            let piece = buf.split_to(take);
            writer::write_chunk(client, &piece).await?;
            remaining -= take;
        }
        Ok(())
    }

    /// Relays a chunked upstream body, decoding its framing and forwarding
    /// only the payload bytes (still one flush per piece). The upstream's
    /// zero chunk and trailer section terminate the body; the relay's own
    /// chunked framing is applied independently by the caller.
    async fn relay_chunked_body(
        &self,
        upstream: &mut TcpStream,
        buf: &mut BytesMut,
        client: &mut TcpStream,
    ) -> Result<()> {
        loop {
            let line = read_line(upstream, buf).await.context("reading chunk size")?;
            let size = parse_chunk_size(&line)?;

            if size == 0 {
                // Trailer section: zero or more header lines, then an empty line.
                loop {
                    let trailer = read_line(upstream, buf)
                        .await
                        .context("reading chunk trailers")?;
                    if trailer.is_empty() {
                        return Ok(());
                    }
                }
            }

            let mut remaining = size;
            while remaining > 0 {
                if buf.is_empty() {
                    let n = upstream.read_buf(buf).await?;
                    if n == 0 {
                        anyhow::bail!("upstream closed mid-chunk");
                    }
                }
                let take = buf.len().min(remaining).min(self.chunk_size);
                let piece = buf.split_to(take);
                writer::write_chunk(client, &piece).await?;
                remaining -= take;
            }

            let delimiter = read_line(upstream, buf)
                .await
                .context("reading chunk delimiter")?;
            anyhow::ensure!(delimiter.is_empty(), "malformed chunk delimiter");
        }
    }

    /// Relays a close-delimited body: no length, no chunking, EOF is the
    /// terminator.
    async fn relay_unsized_body(
        &self,
        upstream: &mut TcpStream,
        buf: &mut BytesMut,
        client: &mut TcpStream,
    ) -> Result<()> {
        while !buf.is_empty() {
            let take = buf.len().min(self.chunk_size);
            let piece = buf.split_to(take);
            writer::write_chunk(client, &piece).await?;
        }

        let mut chunk = vec![0u8; self.chunk_size];
        loop {
            match upstream.read(&mut chunk).await {
                Ok(0) => return Ok(()),
                Ok(n) => writer::write_chunk(client, &chunk[..n]).await?,
                Err(e) => return Err(e).context("upstream body read failed"),
            }
        }
    }
}

/// Assembles the final response header set: every upstream header verbatim,
/// minus the upstream's body framing (this relay re-frames the body as
/// chunked), plus the streaming-oriented overrides.
fn streaming_headers(upstream_headers: Headers) -> Headers {
    let mut headers: Headers = upstream_headers
        .into_iter()
        .filter(|(k, _)| {
            !k.eq_ignore_ascii_case("Content-Length") && !k.eq_ignore_ascii_case("Transfer-Encoding")
        })
        .collect();

    set_header(&mut headers, "Content-Type", "text/event-stream");
    set_header(&mut headers, "Cache-Control", "no-cache");
    set_header(&mut headers, "Transfer-Encoding", "chunked");
    set_header(&mut headers, "Connection", "keep-alive");
    set_header(&mut headers, "Access-Control-Allow-Origin", "*");

    headers
}

/// Reads one CRLF-terminated line, refilling `buf` from the upstream as
/// needed. Returns the line without its terminator.
async fn read_line(upstream: &mut TcpStream, buf: &mut BytesMut) -> Result<BytesMut> {
    loop {
        if let Some(pos) = buf.windows(2).position(|w| w == b"\r\n") {
            let line = buf.split_to(pos);
            buf.advance(2);
            return Ok(line);
        }
        if buf.len() > MAX_CHUNK_LINE {
            anyhow::bail!("chunk line too long");
        }
        let n = upstream.read_buf(buf).await?;
        if n == 0 {
            anyhow::bail!("upstream closed mid-chunked body");
        }
    }
}

/// Parses a chunk-size line: hex digits, optionally followed by extensions
/// after a semicolon.
fn parse_chunk_size(line: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(line).context("chunk size line is not ascii")?;
    let hex = text.split(';').next().unwrap_or("").trim();
    usize::from_str_radix(hex, 16).with_context(|| format!("invalid chunk size: {text:?}"))
}

async fn respond_error(client: &mut TcpStream, error: &anyhow::Error) -> Result<()> {
    let response = Response::internal_error(&error.to_string());
    ResponseWriter::new(&response).write_to_stream(client).await
}
