use serde::{Deserialize, Serialize};

/// Outcome of probing one credential-capability pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityState {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    #[serde(rename = "type")]
    pub capability: String,
    #[serde(rename = "status")]
    pub state: CapabilityState,
}

/// Per-credential slice of a report. `usage` and `limit` are reserved
/// fields, always 0.0 for now, carried for wire compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub index: u32,
    pub key: String,
    pub usage: f64,
    pub limit: f64,
    pub remark: String,
    #[serde(rename = "type_status")]
    pub capability_results: Vec<CapabilityResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub executor_name: String,
    pub executor_addr: String,
}

/// One full aggregation cycle's output. Built fresh every cycle, serialized
/// and delivered to the scheduler center, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "api_status")]
    pub credential_statuses: Vec<CredentialStatus>,
    #[serde(rename = "sys_status")]
    pub system_status: SystemStatus,
}
