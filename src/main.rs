mod config;
mod decoder;
mod envelope;
mod publisher;
mod registry;
mod server;
mod stats;

use clap::Parser;
use config::Config;
use registry::Registry;
use stats::Stats;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();

    let config = Config::parse();

    let registry = Registry::load(&config.descriptor_path)?;
    info!(
        sensors = registry.len(),
        descriptor_path = %config.descriptor_path,
        "sensor descriptor table loaded"
    );

    let stats = Stats::new();

    info!(
        listen = config.listen_addr(),
        broker = %config.broker,
        topic = %config.topic_measurements,
        "libellium-ingest starting"
    );

    let stats_clone = stats.clone();
    let stats_interval = config.stats_interval_secs;
    tokio::spawn(async move {
        stats::stats_reporter(stats_clone, stats_interval).await;
    });

    let server_handle = server::spawn_server(Arc::new(config), Arc::new(registry), stats).await?;

    info!("listening for Libellium frames");

    server_handle.await?;

    Ok(())
}
