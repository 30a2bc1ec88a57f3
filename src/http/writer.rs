use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::http::response::{Headers, Response, StatusCode};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a status line plus the complete header set.
///
/// The relay depends on this taking the *full* header set up front: once the
/// head is on the wire no further headers can be added, so callers assemble
/// everything (upstream headers and local overrides) before calling.
pub fn serialize_head(status: StatusCode, headers: &Headers) -> Vec<u8> {
    let mut buf = Vec::new();

    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        status.as_u16(),
        status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    for (k, v) in headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(b"\r\n");
    buf
}

fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = serialize_head(resp.status, &resp.headers);
    buf.extend_from_slice(&resp.body);
    buf
}

/// One chunked-transfer-encoding frame for `data`.
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(data.len() + 8);
    buf.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Writes one chunk frame and flushes immediately. Empty reads are skipped
/// rather than framed, since a zero-length chunk would terminate the stream.
pub async fn write_chunk(stream: &mut TcpStream, data: &[u8]) -> anyhow::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    stream.write_all(&encode_chunk(data)).await?;
    stream.flush().await?;
    Ok(())
}

/// Writes the terminating zero chunk, completing the chunked body so the
/// connection can be kept alive for the next request.
pub async fn write_final_chunk(stream: &mut TcpStream) -> anyhow::Result<()> {
    stream.write_all(b"0\r\n\r\n").await?;
    stream.flush().await?;
    Ok(())
}

/// Writes a fully buffered response to the client.
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    pub async fn write_to_stream(&mut self, stream: &mut TcpStream) -> anyhow::Result<()> {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
