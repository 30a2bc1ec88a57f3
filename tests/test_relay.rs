//! Tests for the streaming relay against simulated upstreams

use outpost::http::client::Origin;
use outpost::http::connection::Connection;
use outpost::http::request::{Method, RequestBuilder};
use outpost::relay::Relay;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Starts a relay listener wired to `upstream` and returns its address.
async fn spawn_relay(upstream: SocketAddr) -> SocketAddr {
    let relay = Arc::new(Relay::new(
        Origin::parse(&format!("http://{upstream}")).unwrap(),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let relay = relay.clone();
            tokio::spawn(async move {
                let _ = Connection::new(socket, relay).run().await;
            });
        }
    });

    addr
}

/// Sends a raw request and records every read with its arrival time.
async fn send_and_collect(addr: SocketAddr, request: &str) -> Vec<(Instant, Vec<u8>)> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut arrivals = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_secs(5), stream.read(&mut tmp)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => arrivals.push((Instant::now(), tmp[..n].to_vec())),
            _ => break,
        }
    }
    arrivals
}

fn collected_text(arrivals: &[(Instant, Vec<u8>)]) -> String {
    let bytes: Vec<u8> = arrivals.iter().flat_map(|(_, b)| b.clone()).collect();
    String::from_utf8_lossy(&bytes).to_string()
}

/// Arrival time of the first occurrence of `byte` in the response *body*.
/// The head is skipped: relay-added headers contain most capital letters.
fn body_arrival(arrivals: &[(Instant, Vec<u8>)], byte: u8) -> Option<Instant> {
    let stamped: Vec<(Instant, u8)> = arrivals
        .iter()
        .flat_map(|(t, b)| b.iter().map(|&x| (*t, x)))
        .collect();
    let bytes: Vec<u8> = stamped.iter().map(|(_, b)| *b).collect();
    let head_end = bytes.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
    stamped[head_end..]
        .iter()
        .find(|(_, b)| *b == byte)
        .map(|(t, _)| *t)
}

async fn read_upstream_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = stream.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (k, v) = line.split_once(':')?;
                    k.trim()
                        .eq_ignore_ascii_case("content-length")
                        .then(|| v.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if buf.len() >= pos + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Decodes the relay's chunked framing, returning the application payload.
fn decode_chunked(mut body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let pos = body
            .windows(2)
            .position(|w| w == b"\r\n")
            .expect("chunk size line");
        let size =
            usize::from_str_radix(std::str::from_utf8(&body[..pos]).unwrap().trim(), 16).unwrap();
        body = &body[pos + 2..];
        if size == 0 {
            return out;
        }
        out.extend_from_slice(&body[..size]);
        body = &body[size + 2..];
    }
}

const COMPLETION_REQUEST: &str = "POST /v1/chat/completions HTTP/1.1\r\nHost: relay\r\nConnection: close\r\nContent-Length: 18\r\n\r\n{\"model\": \"gpt-4\"}";

#[tokio::test]
async fn test_relay_streams_each_chunk_as_it_arrives() {
    // Upstream emits A, B, C with 150ms gaps; a relay that buffered the
    // whole body would deliver them in a single late burst.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_upstream_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n")
            .await
            .unwrap();
        stream.flush().await.unwrap();
        for byte in [b"A", b"B", b"C"] {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stream.write_all(byte).await.unwrap();
            stream.flush().await.unwrap();
        }
    });

    let relay_addr = spawn_relay(upstream_addr).await;
    let arrivals = send_and_collect(relay_addr, COMPLETION_REQUEST).await;
    let text = collected_text(&arrivals);

    assert!(text.contains('A') && text.contains('B') && text.contains('C'));

    let t_a = body_arrival(&arrivals, b'A').unwrap();
    let t_c = body_arrival(&arrivals, b'C').unwrap();
    assert!(
        t_c.duration_since(t_a) >= Duration::from_millis(200),
        "chunks arrived together; relay buffered instead of flushing per read"
    );
}

#[tokio::test]
async fn test_relay_client_observes_upstream_and_relay_headers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_upstream_request(&mut stream).await;
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nX-Upstream: 1\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\nhi",
            )
            .await
            .unwrap();
    });

    let relay_addr = spawn_relay(upstream_addr).await;
    let text = collected_text(&send_and_collect(relay_addr, COMPLETION_REQUEST).await);

    let head_end = text.find("\r\n\r\n").unwrap();
    let head = &text[..head_end];

    assert!(head.starts_with("HTTP/1.1 200 OK"));
    // The upstream's own header and every relay-added header must all land
    // before the body separator; none may be dropped by late writes.
    assert!(head.contains("X-Upstream: 1"));
    assert!(head.contains("Cache-Control: no-cache"));
    assert!(head.contains("Content-Type: text/event-stream"));
    assert!(head.contains("Transfer-Encoding: chunked"));
    assert!(head.contains("Access-Control-Allow-Origin: *"));
    // The body is re-framed as chunked, so the upstream length must go.
    assert!(!head.contains("Content-Length"));
    assert!(text[head_end..].contains("hi"));
}

#[tokio::test]
async fn test_relay_passes_upstream_status_through() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_upstream_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
    });

    let relay_addr = spawn_relay(upstream_addr).await;
    let text = collected_text(&send_and_collect(relay_addr, COMPLETION_REQUEST).await);

    assert!(text.starts_with("HTTP/1.1 404 Not Found"));
}

#[tokio::test]
async fn test_relay_unreachable_upstream_returns_500() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    drop(listener);

    let relay_addr = spawn_relay(upstream_addr).await;
    let text = collected_text(&send_and_collect(relay_addr, COMPLETION_REQUEST).await);

    assert!(text.starts_with("HTTP/1.1 500 Internal Server Error"));
    assert!(text.contains("Content-Type: text/plain"));
    // The raw error text is the body.
    let body = &text[text.find("\r\n\r\n").unwrap() + 4..];
    assert!(!body.is_empty());
}

#[tokio::test]
async fn test_relay_forwards_method_path_headers_and_body() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(1);
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_upstream_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        let _ = tx.send(request).await;
    });

    let relay_addr = spawn_relay(upstream_addr).await;
    let request = "POST /v1/chat/completions HTTP/1.1\r\nHost: relay\r\nConnection: close\r\nX-Custom: abc\r\nContent-Type: text/plain\r\nContent-Length: 18\r\n\r\n{\"model\": \"gpt-4\"}";
    send_and_collect(relay_addr, request).await;

    let seen = rx.recv().await.unwrap();
    assert!(seen.starts_with("POST /v1/chat/completions HTTP/1.1\r\n"));
    assert!(seen.contains(&format!("Host: {upstream_addr}\r\n")));
    // Verbatim passthrough of ordinary headers.
    assert!(seen.contains("X-Custom: abc\r\n"));
    // Relay overrides.
    assert!(seen.contains("Content-Type: application/json\r\n"));
    assert!(seen.contains("Connection: keep-alive\r\n"));
    assert!(seen.contains("Keep-Alive: timeout=360\r\n"));
    assert!(seen.ends_with("{\"model\": \"gpt-4\"}"));
}

#[tokio::test]
async fn test_relay_completes_sized_body_while_upstream_stays_open() {
    // A keep-alive upstream delivers its Content-Length body and then holds
    // the socket open; the relay must finish on the advertised length, not
    // wait for an EOF that never comes.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_upstream_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: keep-alive\r\n\r\nhi")
            .await
            .unwrap();
        stream.flush().await.unwrap();
        // Keep the connection open well past the test window.
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let relay_addr = spawn_relay(upstream_addr).await;
    let start = Instant::now();
    let text = collected_text(&send_and_collect(relay_addr, COMPLETION_REQUEST).await);

    assert!(start.elapsed() < Duration::from_secs(4), "relay waited for upstream EOF");
    assert!(text.contains("hi"));
    assert!(text.ends_with("0\r\n\r\n"), "chunked body was never terminated");
}

#[tokio::test]
async fn test_relay_decodes_chunked_upstream_body() {
    // Chunked upstreams are re-framed: their hex size lines and CRLFs must
    // never leak into the payload the client decodes.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_upstream_request(&mut stream).await;
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
            )
            .await
            .unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let relay_addr = spawn_relay(upstream_addr).await;
    let text = collected_text(&send_and_collect(relay_addr, COMPLETION_REQUEST).await);

    let head_end = text.find("\r\n\r\n").unwrap();
    let payload = decode_chunked(text[head_end + 4..].as_bytes());
    assert_eq!(String::from_utf8(payload).unwrap(), "hello world");
}

#[tokio::test]
async fn test_relay_truncated_sized_body_is_not_finalized() {
    // The upstream promises 10 bytes but closes after 2: the relay must
    // drop the connection without the zero chunk so the client can tell
    // the body was cut short.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = read_upstream_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhi")
            .await
            .unwrap();
        stream.flush().await.unwrap();
    });

    let relay_addr = spawn_relay(upstream_addr).await;
    let text = collected_text(&send_and_collect(relay_addr, COMPLETION_REQUEST).await);

    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("hi"));
    assert!(
        !text.ends_with("0\r\n\r\n"),
        "truncated body must not be presented as complete"
    );
}

#[tokio::test]
async fn test_ping_endpoint_answers_locally() {
    // No upstream involvement at all.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    drop(listener);

    let relay_addr = spawn_relay(upstream_addr).await;
    let text = collected_text(
        &send_and_collect(
            relay_addr,
            "GET /ping HTTP/1.1\r\nHost: relay\r\nConnection: close\r\n\r\n",
        )
        .await,
    );

    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.ends_with("ok"));
}

#[test]
fn test_build_upstream_request_applies_overrides() {
    let relay = Relay::new(Origin::parse("http://localhost:3000").unwrap());

    let request = RequestBuilder::new()
        .method(Method::POST)
        .path("/v1/chat/completions")
        .header("Authorization", "Bearer sk-test")
        .header("Content-Type", "text/plain")
        .header("Host", "client-facing-host")
        .body(b"{\"model\": \"gpt-4\"}".to_vec())
        .build()
        .unwrap();

    let bytes = relay.build_upstream_request(&request);
    let text = String::from_utf8_lossy(&bytes);

    assert!(text.starts_with("POST /v1/chat/completions HTTP/1.1\r\n"));
    assert!(text.contains("Host: localhost:3000\r\n"));
    assert!(!text.contains("client-facing-host"));
    assert!(text.contains("Authorization: Bearer sk-test\r\n"));
    assert!(text.contains("Content-Type: application/json\r\n"));
    assert!(text.contains("Connection: keep-alive\r\n"));
    assert!(text.contains("Keep-Alive: timeout=360\r\n"));
    assert!(text.contains("Content-Length: 18\r\n"));
    assert!(text.ends_with("{\"model\": \"gpt-4\"}"));
}
