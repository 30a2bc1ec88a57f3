//! HTTP protocol implementation.
//!
//! A small HTTP/1.1 layer over raw `TcpStream`s, used on both sides of the
//! relay:
//!
//! - **`connection`**: the inbound connection handler (request-response state
//!   machine with keep-alive) that routes `/ping` locally and hands every
//!   other request to the relay
//! - **`parser`**: parses inbound requests and upstream response heads from
//!   byte buffers
//! - **`request`** / **`response`**: request and response representations
//! - **`client`**: minimal outbound client (build request bytes, connect,
//!   read the response head and body) used by the prober and the reporter
//! - **`writer`**: serializes responses and chunked-encoding frames

pub mod client;
pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
