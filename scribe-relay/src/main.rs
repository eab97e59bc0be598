//! Scribe relay — reference WebSocket server for collaborative documents.
//!
//! Usage: `scribe-relay [ADDR]`. The address falls back to
//! `SCRIBE_RELAY_ADDR`, then `127.0.0.1:9090`. Log output is controlled
//! with `RUST_LOG`.

use std::sync::Arc;

use log::info;
use scribe_collab::server::{RelayConfig, RelayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let mut config = RelayConfig::default();
    if let Some(addr) = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SCRIBE_RELAY_ADDR").ok())
    {
        config.bind_addr = addr;
    }

    info!("Starting Scribe relay on {}...", config.bind_addr);
    let server = Arc::new(RelayServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            signal_server.shutdown();
        }
    });

    server.run().await
}
