//! Outbound HTTP/1.1 over raw `TcpStream`s.
//!
//! Shared by the prober (status-only requests), the reporter (request plus
//! response body) and the relay (which reuses the request builder and head
//! reader, then streams the body itself).

use crate::http::parser::{self, ParseError};
use crate::http::request::Method;
use crate::http::response::{ResponseHead, StatusCode};
use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

const READ_BUFFER_SIZE: usize = 8192;
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// An `http://host:port` origin to dial.
#[derive(Debug, Clone)]
pub struct Origin {
    host: String,
    port: u16,
}

impl Origin {
    pub fn parse(s: &str) -> Result<Self> {
        let url = Url::parse(s).with_context(|| format!("invalid origin url: {s}"))?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        anyhow::ensure!(
            url.scheme() == "http",
            "unsupported origin scheme: {}",
            url.scheme()
        );
        let host = url
            .host_str()
            .context("origin url missing host")?
            .to_string();
        let port = url.port().unwrap_or(80);
        Ok(Self { host, port })
    }

    /// Value for the outbound Host header; the port is omitted when default.
    pub fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub async fn connect(&self) -> Result<TcpStream> {
        TcpStream::connect((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("failed to connect to {}:{}", self.host, self.port))
    }
}

/// Serializes an outbound request. The Host and Content-Length headers are
/// written here; everything else comes from `headers` in order.
pub fn build_request(
    method: &Method,
    path: &str,
    host: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> Vec<u8> {
    let mut buf = Vec::new();

    let path = if path.is_empty() { "/" } else { path };
    buf.extend_from_slice(format!("{} {} HTTP/1.1\r\n", method.as_str(), path).as_bytes());
    buf.extend_from_slice(format!("Host: {host}\r\n").as_bytes());

    for (key, value) in headers {
        buf.extend_from_slice(format!("{key}: {value}\r\n").as_bytes());
    }

    buf.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(body);

    buf
}

/// Reads from `stream` until a complete response head is buffered, then
/// parses it. Any body bytes read past the head remain at the front of `buf`.
pub async fn read_response_head(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<ResponseHead> {
    loop {
        match parser::parse_response_head(buf) {
            Ok((head, consumed)) => {
                buf.advance(consumed);
                return Ok(head);
            }
            Err(ParseError::Incomplete) => {}
            Err(e) => anyhow::bail!("invalid response head: {:?}", e),
        }

        if buf.len() > MAX_HEAD_SIZE {
            anyhow::bail!("response head too large");
        }

        let n = stream.read_buf(buf).await?;
        if n == 0 {
            anyhow::bail!("connection closed before response head was received");
        }
    }
}

/// Reads the response body: Content-Length bytes when advertised, otherwise
/// until the upstream closes the connection.
async fn read_body(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    head: &ResponseHead,
) -> Result<Vec<u8>> {
    let content_length = head
        .header("Content-Length")
        .map(|v| v.parse::<usize>().context("invalid Content-Length"))
        .transpose()?;

    let mut body = Vec::new();
    body.extend_from_slice(buf);
    buf.clear();

    match content_length {
        Some(len) => {
            while body.len() < len {
                let n = stream.read_buf(buf).await?;
                if n == 0 {
                    anyhow::bail!("connection closed before complete body was received");
                }
                body.extend_from_slice(buf);
                buf.clear();
            }
            body.truncate(len);
        }
        None => loop {
            let n = stream.read_buf(buf).await?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(buf);
            buf.clear();
        },
    }

    Ok(body)
}

/// Issues one POST and reads the full response, all within `deadline`.
///
/// The connection is not reused; `Connection: close` is sent so bodies
/// without a Content-Length are delimited by EOF.
pub async fn post(
    origin: &Origin,
    path: &str,
    headers: &[(&str, &str)],
    body: &[u8],
    deadline: Duration,
) -> Result<(StatusCode, Vec<u8>)> {
    timeout(deadline, async {
        let mut stream = origin.connect().await?;

        let mut all_headers: Vec<(&str, &str)> = headers.to_vec();
        all_headers.push(("Connection", "close"));
        let request = build_request(&Method::POST, path, &origin.host_header(), &all_headers, body);

        stream.write_all(&request).await?;
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let head = read_response_head(&mut stream, &mut buf).await?;
        let body = read_body(&mut stream, &mut buf, &head).await?;

        Ok((head.status, body))
    })
    .await
    .context("request timed out")?
}
