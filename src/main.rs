//! StreamRaft replica node.
//!
//! Runs one election state machine, serves the video API and, when
//! enabled, the thumbnail worker. SIGTERM/SIGINT stop the listener, the
//! election task and the worker together.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use streamraft::cluster::{ElectionLoop, ElectionTiming, ReplicaState};
use streamraft::queue::{message_handler, InProcessQueue, MessageQueue, VIDEO_UPLOADED};
use streamraft::thumbnail::{run_worker, FfmpegThumbnailer, WorkerOptions};

const DEFAULT_PORT: u16 = 9000;

/// Command-line arguments for the replica node.
#[derive(Parser, Debug)]
#[command(name = "streamraft", version, about = "Leader-elected video replica")]
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
        info!("Prometheus metrics initialized");
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| config.server.bind_addr(DEFAULT_PORT));

    let store = streamraft::storage::build_object_store(&config.storage).await?;
    let queue: Arc<dyn MessageQueue> = Arc::new(InProcessQueue::new());

    let replica = Arc::new(ReplicaState::new(
        config.node.id.clone(),
        config.node.peer_list(),
        config.node.bootstrap_id.clone(),
    ));
    info!(
        "Replica {} starting as follower (bootstrap id {})",
        replica.id(),
        config.node.bootstrap_id
    );

    let shutdown = CancellationToken::new();
    let election = ElectionLoop::spawn(
        replica.clone(),
        ElectionTiming::from(&config.node),
        shutdown.child_token(),
    );

    let worker = if config.thumbnail.enabled {
        info!("Thumbnail worker enabled ({})", config.thumbnail.ffmpeg_path);
        run_worker(
            queue.as_ref(),
            store.clone(),
            Arc::new(FfmpegThumbnailer::new(config.thumbnail.ffmpeg_path.clone())),
            WorkerOptions {
                default_bucket: config.storage.bucket.clone(),
                at_second: config.thumbnail.at_second,
                timeout: Duration::from_secs(config.thumbnail.timeout_seconds),
            },
            shutdown.child_token(),
        )?
    } else {
        // Nothing else consumes upload events in this process.
        queue.consume(
            VIDEO_UPLOADED,
            message_handler(|body| async move {
                debug!("Thumbnails disabled, dropping upload event ({} bytes)", body.len());
                Ok(())
            }),
            shutdown.child_token(),
        )?
    };

    let state = Arc::new(streamraft::AppState {
        config: config.clone(),
        replica,
        store,
        queue,
    });
    let app = streamraft::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Node {} listening on {}", config.node.id, bind_addr);

    streamraft::server::serve(
        listener,
        app,
        shutdown.clone(),
        Duration::from_secs(config.server.shutdown_timeout),
    )
    .await?;

    shutdown.cancel();
    election.stop().await;
    if let Err(e) = worker.await {
        debug!("Upload consumer ended abnormally: {}", e);
    }
    info!("Node {} shut down", config.node.id);

    Ok(())
}
