//! Outpost - Credential-Fronting Streaming Relay
//!
//! Fronts a set of upstream API credentials behind a single listen address:
//! relays client requests to a fixed upstream origin with chunk-by-chunk
//! response streaming, and periodically probes every credential against its
//! configured capability types, reporting the aggregate status to a
//! scheduler center.

pub mod config;
pub mod http;
pub mod relay;
pub mod report;
pub mod server;
pub mod status;
