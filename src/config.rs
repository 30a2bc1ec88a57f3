use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Default upstream origin the relay and prober talk to.
pub const DEFAULT_UPSTREAM: &str = "http://api.openai.com";

/// Completion endpoint used for capability probes.
pub const COMPLETION_PATH: &str = "/v1/chat/completions";

/// One upstream API credential and the capability types it is expected
/// to support.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    pub index: u32,
    pub key: String,
    /// Capability names, probed independently (wire name `type`).
    #[serde(rename = "type")]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub remark: String,
}

/// Process-wide configuration, loaded once from a JSON file and shared
/// read-only (via `Arc`) by the relay, the prober and the reporter.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_keys: Vec<Credential>,
    pub executor_name: String,
    /// Destination URL for periodic status reports.
    pub scheduler_center: String,
    #[serde(default)]
    pub report_enable: bool,
    /// Seconds between report cycles.
    #[serde(default = "default_report_duration")]
    pub report_duration: u64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Upstream origin override; defaults to the fixed origin.
    #[serde(default = "default_upstream")]
    pub upstream: String,
}

fn default_report_duration() -> u64 {
    60
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_upstream() -> String {
    DEFAULT_UPSTREAM.to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }
}
