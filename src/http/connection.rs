use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::parser::{parse_http_request, ParseError};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::relay::Relay;

pub struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
    state: ConnectionState,
    relay: Arc<Relay>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, relay: Arc<Relay>) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
            relay,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    match self.read_request().await? {
                        Some(req) => {
                            self.state = ConnectionState::Processing(req);
                        }
                        None => {
                            self.state = ConnectionState::Closed;
                        }
                    }
                }

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();

                    if req.path == "/ping" {
                        let writer = ResponseWriter::new(&Response::ok("ok"));
                        self.state = ConnectionState::Writing(writer, keep_alive);
                    } else {
                        // The relay streams straight onto the socket; a write
                        // error mid-stream surfaces here and closes the
                        // connection.
                        self.relay.forward(&req, &mut self.stream).await?;
                        self.state = if keep_alive {
                            ConnectionState::Reading
                        } else {
                            ConnectionState::Closed
                        };
                    }
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        self.state = ConnectionState::Reading;
                    } else {
                        self.state = ConnectionState::Closed;
                    }
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    async fn read_request(&mut self) -> anyhow::Result<Option<Request>> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => {
                    return Err(anyhow::anyhow!("HTTP parse error: {:?}", e));
                }
            }

            let mut temp = [0u8; 1024];
            let n = self.stream.read(&mut temp).await?;

            if n == 0 {
                // Client closed connection
                return Ok(None);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }
}
