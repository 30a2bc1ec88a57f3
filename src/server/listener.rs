use crate::config::Config;
use crate::http::client::Origin;
use crate::http::connection::Connection;
use crate::relay::Relay;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub async fn run(cfg: Arc<Config>) -> anyhow::Result<()> {
    let origin = Origin::parse(&cfg.upstream)?;
    let relay = Arc::new(Relay::new(origin));

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("Listening on {}", cfg.listen_addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::debug!(peer = %peer, "accepted connection");

        let relay = relay.clone();
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, relay);
            if let Err(e) = conn.run().await {
                tracing::error!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}
