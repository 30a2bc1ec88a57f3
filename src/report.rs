//! Periodic status reporting to the scheduler center.

use crate::config::Config;
use crate::http::client::{self, Origin};
use crate::status::{Aggregator, Prober};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

const REPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the report loop forever: aggregate, serialize, POST, sleep.
///
/// Every failure is cycle-local — serialization or delivery errors are
/// logged and the next cycle proceeds on schedule.
pub async fn run(config: Arc<Config>) {
    let collector = match Url::parse(&config.scheduler_center) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(url = %config.scheduler_center, error = %e, "invalid scheduler center url, reporting disabled");
            return;
        }
    };

    let origin = match Origin::from_url(&collector) {
        Ok(origin) => origin,
        Err(e) => {
            tracing::error!(url = %collector, error = %e, "unusable scheduler center url, reporting disabled");
            return;
        }
    };

    let upstream = match Origin::parse(&config.upstream) {
        Ok(origin) => origin,
        Err(e) => {
            tracing::error!(url = %config.upstream, error = %e, "invalid upstream origin, reporting disabled");
            return;
        }
    };

    let aggregator = Aggregator::new(config.clone(), Prober::new(upstream));
    let interval = Duration::from_secs(config.report_duration.max(1));

    loop {
        deliver(&aggregator, &origin, collector.path()).await;
        sleep(interval).await;
    }
}

async fn deliver(aggregator: &Aggregator, origin: &Origin, path: &str) {
    let report = aggregator.aggregate().await;

    let payload = match serde_json::to_vec(&report) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize status report, skipping cycle");
            return;
        }
    };

    let headers = [("Content-Type", "application/json")];
    match client::post(origin, path, &headers, &payload, REPORT_TIMEOUT).await {
        Ok((status, body)) => {
            tracing::info!(
                status = status.as_u16(),
                response = %String::from_utf8_lossy(&body),
                "status report delivered"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to deliver status report");
        }
    }
}
