//! StreamRaft gateway: the single entry point clients talk to.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use streamraft::gateway::{self, GatewayState};

const DEFAULT_PORT: u16 = 8080;

/// Command-line arguments for the gateway.
#[derive(Parser, Debug)]
#[command(
    name = "streamraft-gateway",
    version,
    about = "Routes client requests to the current StreamRaft leader"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "streamraft.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = streamraft::config::load_config(&cli.config)?;
    streamraft::logging::init(&config.logging)?;
    info!("Loaded configuration from {}", cli.config);

    if config.observability.metrics {
        streamraft::metrics::init_metrics()?;
        streamraft::metrics::describe_metrics();
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| config.server.bind_addr(DEFAULT_PORT));

    let state = Arc::new(GatewayState::new(&config)?);
    let app = gateway::app(state, &config.gateway.cors_origins);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Gateway listening on {}", bind_addr);

    streamraft::server::serve(
        listener,
        app,
        CancellationToken::new(),
        Duration::from_secs(config.server.shutdown_timeout),
    )
    .await?;

    info!("Gateway shut down");
    Ok(())
}
