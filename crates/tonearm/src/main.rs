//! tonearm: connects to every configured audio node, keeps the connections
//! alive and logs what the pool sees until interrupted.

mod cli;
mod gateway;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tonearm_config::TonearmConfig;
use tonearm_link::{NodePool, PoolEvent};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::gateway::LoggingGateway;

#[tokio::main]
async fn main() -> tonearm_common::Result<()> {
    let args = cli::parse();

    let config = match &args.config {
        Some(path) => tonearm_config::load_config_from(Path::new(path))?,
        None => tonearm_config::load_config()?,
    };

    init_logging(args.log_level.as_deref(), &config);

    if args.check {
        info!(nodes = config.nodes.len(), "Config OK");
        return Ok(());
    }

    let (pool, mut events) = NodePool::from_config(&config, Arc::new(LoggingGateway));
    pool.connect().await;

    let mut ticker = tokio::time::interval(Duration::from_secs(args.stats_interval.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    // A failed Ctrl-C listener ends the run and becomes the exit error.
    let outcome = loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = &result {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Shutting down");
                break result;
            }
            Some(event) = events.recv() => log_event(&event),
            _ = ticker.tick() => log_status(&pool).await,
        }
    };

    pool.destroy().await;
    outcome?;
    Ok(())
}

/// `--log-level` wins, then `RUST_LOG`, then `[logging] level`.
fn init_logging(cli_level: Option<&str>, config: &TonearmConfig) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(format!("tonearm={level}")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("tonearm={}", config.logging.level))),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_event(event: &PoolEvent) {
    match event {
        PoolEvent::NodeReady(node) => info!(node = %node, "Node ready"),
        PoolEvent::NodeDisconnected { node, reason } => {
            warn!(node = %node, reason = %reason, "Node disconnected")
        }
        PoolEvent::NodeError { node, message } => warn!(node = %node, error = %message, "Node error"),
        PoolEvent::Unroutable { node, guild_id } => {
            debug!(node = %node, guild = %guild_id, "Unroutable message")
        }
        PoolEvent::Session { guild_id, event } => info!(guild = %guild_id, event = ?event, "Session event"),
    }
}

async fn log_status(pool: &NodePool) {
    for node in pool.nodes() {
        let stats = node.stats().await;
        info!(
            node = %node.id(),
            state = ?node.state().await,
            draining = node.is_draining().await,
            retries = node.retries().await,
            players = stats.players,
            playing = stats.playing_players,
            "Node status"
        );
    }
}
