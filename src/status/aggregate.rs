use crate::config::Config;
use crate::status::model::{CapabilityState, CredentialStatus, Report, SystemStatus};
use crate::status::probe::Prober;
use std::sync::Arc;

/// Drives the prober across every configured credential and assembles one
/// report per cycle.
pub struct Aggregator {
    config: Arc<Config>,
    prober: Prober,
}

impl Aggregator {
    pub fn new(config: Arc<Config>, prober: Prober) -> Self {
        Self { config, prober }
    }

    /// Probes credentials sequentially (one credential's capability fan-out
    /// completes before the next begins) and returns exactly one status per
    /// configured credential, in configuration order.
    ///
    /// A credential whose probes all fail still gets an entry; its
    /// capabilities simply read inactive or empty. Nothing here can abort
    /// the cycle.
    pub async fn aggregate(&self) -> Report {
        let mut statuses = Vec::with_capacity(self.config.api_keys.len());

        for credential in &self.config.api_keys {
            let results = self
                .prober
                .probe(&credential.key, &credential.capabilities)
                .await;

            let active = results
                .iter()
                .filter(|r| r.state == CapabilityState::Active)
                .count();
            tracing::debug!(
                index = credential.index,
                active = active,
                probed = results.len(),
                "credential probed"
            );

            statuses.push(CredentialStatus {
                index: credential.index,
                key: credential.key.clone(),
                usage: 0.0,
                limit: 0.0,
                remark: credential.remark.clone(),
                capability_results: results,
            });
        }

        Report {
            credential_statuses: statuses,
            system_status: SystemStatus {
                executor_name: self.config.executor_name.clone(),
                executor_addr: self.config.listen_addr.clone(),
            },
        }
    }
}
