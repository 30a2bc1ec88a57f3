use std::sync::Arc;

use outpost::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());

    let cfg = Arc::new(Config::load(&config_path)?);

    if cfg.report_enable {
        tokio::spawn(outpost::report::run(cfg.clone()));
    }

    tokio::select! {
        res = outpost::server::listener::run(cfg) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
