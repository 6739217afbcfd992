//! Sorteo service binary: wires the store, the lifecycle engine, and the
//! background sweep, then runs until interrupted.

use clap::Parser;
use sorteo::{ConfigLoader, LifecycleEngine, LogAuditSink, Scheduler, VenueStorage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "sorteo", about = "Numbers-lottery venue lifecycle service")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Override the storage data directory
    #[arg(long)]
    data_dir: Option<String>,

    /// Override the sweep interval in seconds
    #[arg(long)]
    sweep_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = cli.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(secs) = cli.sweep_interval_secs {
        config.scheduler.sweep_interval_secs = secs;
    }

    let storage = Arc::new(VenueStorage::open(&config.storage.data_dir)?);
    let engine = Arc::new(LifecycleEngine::new(storage, Arc::new(LogAuditSink)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(
        engine.clone(),
        Duration::from_secs(config.scheduler.sweep_interval_secs),
    );
    let sweep_handle = scheduler.spawn(shutdown_rx);

    tracing::info!(data_dir = %config.storage.data_dir, "sorteo service running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, finishing in-flight sweep");
    let _ = shutdown_tx.send(true);
    sweep_handle.await?;

    Ok(())
}
