use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay_chat::config::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_CLIENTS, DEFAULT_OUTBOUND_CAPACITY,
    DEFAULT_RELAY_CAPACITY,
};
use relay_chat::protocol::DEFAULT_PORT;
use relay_chat::{AcceptAll, Server, ServerConfig, logging};

/// Relays every chat message to all other connected clients.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    #[arg(long, env = "RELAY_CHAT_HOST", default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, env = "RELAY_CHAT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, env = "RELAY_CHAT_MAX_CLIENTS", default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    #[arg(long, env = "RELAY_CHAT_RELAY_CAPACITY", default_value_t = DEFAULT_RELAY_CAPACITY)]
    relay_capacity: usize,

    #[arg(long, env = "RELAY_CHAT_OUTBOUND_CAPACITY", default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    outbound_capacity: usize,

    #[arg(long, env = "RELAY_CHAT_LOG", default_value = DEFAULT_LOG_FILTER)]
    log: String,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_clients: args.max_clients,
            relay_capacity: args.relay_capacity,
            outbound_capacity: args.outbound_capacity,
            log_filter: args.log,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from(Args::parse());
    logging::init(&config.log_filter);

    let server = Server::bind(config, Arc::new(AcceptAll)).await?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received"),
            Err(err) => {
                warn!(error = %err, "failed to listen for interrupt");
                return;
            }
        }
        trigger.cancel();
    });

    server.run(shutdown).await?;

    Ok(())
}
