use crate::http::request::{Method, Request};
use crate::http::response::{ResponseHead, StatusCode};
use std::collections::HashMap;

#[derive(Debug)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    InvalidStatusLine,
    Incomplete,
}

/// Parses one inbound HTTP/1.1 request from the front of `buf`.
///
/// Returns the request and the number of bytes consumed, or `Incomplete`
/// when more data is needed (the caller reads more and retries). Bodies are
/// delimited by Content-Length only.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let head = std::str::from_utf8(&buf[..headers_end]).map_err(|_| ParseError::InvalidRequest)?;
    let body_bytes = &buf[headers_end + 4..];

    let mut lines = head.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();
    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .map(|(_, v)| v.parse::<usize>().map_err(|_| ParseError::InvalidContentLength))
        .transpose()?
        .unwrap_or(0);

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body: body_bytes[..content_length].to_vec(),
    };

    Ok((request, headers_end + 4 + content_length))
}

/// Parses the status line and headers of an upstream response from the
/// front of `buf`, leaving any body bytes untouched.
///
/// Header order and duplicates are preserved so the relay can copy them
/// through verbatim.
pub fn parse_response_head(buf: &[u8]) -> Result<(ResponseHead, usize), ParseError> {
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let head =
        std::str::from_utf8(&buf[..headers_end]).map_err(|_| ParseError::InvalidStatusLine)?;

    let mut lines = head.split("\r\n");

    // Status line: "HTTP/1.1 200 OK" (reason phrase optional)
    let status_line = lines.next().ok_or(ParseError::InvalidStatusLine)?;
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next().ok_or(ParseError::InvalidStatusLine)?;
    let code: u16 = parts
        .next()
        .ok_or(ParseError::InvalidStatusLine)?
        .parse()
        .map_err(|_| ParseError::InvalidStatusLine)?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        headers.push((key.trim().to_string(), value.trim().to_string()));
    }

    let parsed = ResponseHead {
        status: StatusCode(code),
        headers,
    };

    Ok((parsed, headers_end + 4))
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
