use crate::config::COMPLETION_PATH;
use crate::http::client::{self, Origin};
use crate::status::model::{CapabilityResult, CapabilityState};
use std::time::Duration;
use tokio::sync::mpsc;

/// Fixed per-probe deadline covering connect, send and response head.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Probes one credential against a list of capability names, one concurrent
/// request per capability.
pub struct Prober {
    origin: Origin,
    path: String,
    deadline: Duration,
}

impl Prober {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            path: COMPLETION_PATH.to_string(),
            deadline: PROBE_TIMEOUT,
        }
    }

    /// Shortens the per-probe deadline; tests exercising timeouts use this.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Classifies every capability for `key` concurrently and returns the
    /// results in the input capability order.
    ///
    /// Never fails the caller: transport errors and unexpected statuses all
    /// classify as inactive. The channel is sized to the fan-out width so no
    /// producer ever blocks on send; draining until every sender is dropped
    /// is the join barrier — all probes complete before this returns.
    pub async fn probe(&self, key: &str, capabilities: &[String]) -> Vec<CapabilityResult> {
        if capabilities.is_empty() {
            return Vec::new();
        }

        let (tx, mut rx) = mpsc::channel(capabilities.len());

        for capability in capabilities {
            let tx = tx.clone();
            let origin = self.origin.clone();
            let path = self.path.clone();
            let key = key.to_string();
            let capability = capability.clone();
            let deadline = self.deadline;

            tokio::spawn(async move {
                let state = check_capability(&origin, &path, &key, &capability, deadline).await;
                let _ = tx
                    .send(CapabilityResult { capability, state })
                    .await;
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(capabilities.len());
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        // Completion order is nondeterministic; restore the input order so
        // reports are stable.
        results.sort_by_key(|r| capabilities.iter().position(|c| *c == r.capability));
        results
    }
}

/// One probe: a deliberately minimal completion request naming only the
/// capability as the model. The upstream's validation error (400) is the
/// positive signal — it means the credential authenticated and reached the
/// capability's handler. Anything else, including transport failure, is
/// conservatively inactive.
async fn check_capability(
    origin: &Origin,
    path: &str,
    key: &str,
    capability: &str,
    deadline: Duration,
) -> CapabilityState {
    let body = match serde_json::to_vec(&serde_json::json!({ "model": capability })) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(capability = %capability, error = %e, "failed to build probe body");
            return CapabilityState::Inactive;
        }
    };

    let bearer = format!("Bearer {key}");
    let headers = [
        ("Authorization", bearer.as_str()),
        ("Content-Type", "application/json"),
    ];

    match client::post(origin, path, &headers, &body, deadline).await {
        Ok((status, _)) if status.as_u16() == 400 => CapabilityState::Active,
        Ok((status, _)) => {
            tracing::debug!(
                capability = %capability,
                status = status.as_u16(),
                "capability probe rejected"
            );
            CapabilityState::Inactive
        }
        Err(e) => {
            tracing::debug!(capability = %capability, error = %e, "capability probe transport failure");
            CapabilityState::Inactive
        }
    }
}
