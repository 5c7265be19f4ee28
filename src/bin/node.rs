use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use snapshot_node::{
    config::{Config, read_config_file},
    metrics::SystemMetrics,
    session::{self, NodeContext},
    storage::{self, RecordStore},
    transport::Node,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,

    /// Listen address, overrides the config file
    #[arg(short)]
    listen: Option<String>,

    /// Peer to dial after start-up (`/ip4/<ip>/tcp/<port>` or `host:port`)
    peer: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("snapshot_node", LevelFilter::TRACE),
        ("sqlx", LevelFilter::WARN),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };
    if let Some(listen) = &args.listen {
        config.node.listen = vec![listen.clone()];
    }

    let store = storage::open(&config.storage)
        .await
        .context("failed to open record store")?;
    store.ensure_schema().await?;
    let health = store.health_check().await?;
    debug!("record store: {}", health.message);
    seed_records(store.as_ref(), &config).await?;

    let node = Arc::new(Node::bind(&config.node).await?);
    for address in node.addresses() {
        info!("listening on {address} ({})", node.protocol());
    }

    let ctx = Arc::new(NodeContext::new(
        node.clone(),
        Arc::new(SystemMetrics::new()),
        store.clone(),
        config.session.clone(),
    ));

    tokio::spawn(log_snapshots(ctx.subscribe()));

    let server = {
        let node = node.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { node.serve(ctx).await })
    };

    if let Some(peer) = &args.peer {
        match node.dial(peer).await {
            Ok(stream) => {
                let handle = session::start(stream, ctx.clone());
                debug!("session with {} started", handle.peer);
            }
            Err(e) => error!("failed to dial {peer}: {e:#}"),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    server.abort();
    store.close().await?;

    Ok(())
}

async fn seed_records(store: &dyn RecordStore, config: &Config) -> anyhow::Result<()> {
    for record in &config.records {
        store
            .upsert(record.clone())
            .await
            .with_context(|| format!("failed to seed record {}", record.id))?;
    }
    if !config.records.is_empty() {
        debug!("seeded {} records", config.records.len());
    }
    Ok(())
}

#[instrument(skip_all)]
async fn log_snapshots(mut events: broadcast::Receiver<session::SnapshotEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let snapshot = &event.snapshot;
                info!(
                    "snapshot from {} ({}): {} addresses, {} records",
                    event.peer,
                    snapshot.stats.direction,
                    snapshot.addresses.len(),
                    snapshot.records.len()
                );
                match serde_json::to_string_pretty(snapshot) {
                    Ok(pretty) => debug!("{pretty}"),
                    Err(e) => warn!("failed to render snapshot: {e}"),
                }
            }
            Err(RecvError::Lagged(missed)) => warn!("missed {missed} snapshot events"),
            Err(RecvError::Closed) => break,
        }
    }
}
