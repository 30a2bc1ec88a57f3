//! Streaming pass-through relay.
//!
//! Forwards inbound requests to the fixed upstream origin and streams the
//! response back chunk-by-chunk, flushing after every read so token-level
//! streaming is delivered with no added buffering delay.

pub mod upstream;

pub use upstream::Relay;
