use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rust_compas_common::metrics::RelayMetrics;
use rust_compas_relay::{spawn_udp_relay, RelayConfig};
use std::path::PathBuf;
use tokio::signal;

/// COMPAS forwarding node
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Configuration file (TOML); COMPAS__* variables override it
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Run as DODAG root
    #[clap(long)]
    root: bool,

    /// Address to bind, overrides link.bind
    #[clap(short, long)]
    bind: Option<String>,

    /// Sets the level of verbosity
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "debug" } else { "info" }
    )).init();

    let mut config = RelayConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.root {
        config.node.root = true;
    }
    if let Some(bind) = cli.bind {
        config.link.bind = bind;
    }

    info!(
        "Starting compasd on {} ({}), prefix {}",
        config.link.bind,
        if config.node.root { "root" } else { "node" },
        config.node.prefix
    );
    let (handle, task) = spawn_udp_relay(config).await.context("Failed to start relay")?;

    signal::ctrl_c().await.context("Unable to listen for shutdown signal")?;
    info!("Shutting down");
    handle.shutdown().await?;
    let relay = task.await.context("Relay task failed")?;

    info!("Final rank {}, {} cached", relay.dodag().rank, relay.cs().len());
    log_metrics(&relay.metrics());
    Ok(())
}

fn log_metrics(metrics: &RelayMetrics) {
    info!(
        "Interests: {} received, {} forwarded, {} satisfied, {} timed out",
        metrics.interests_received.value(),
        metrics.interests_forwarded.value(),
        metrics.interests_satisfied.value(),
        metrics.interests_timed_out.value()
    );
    info!(
        "Content store: {} hits, {} misses, {} inserts",
        metrics.cs_hits.value(),
        metrics.cs_misses.value(),
        metrics.cs_inserts.value()
    );
    info!(
        "COMPAS: {} PAM, {} NAM, {} SOL sent; {} parent timeouts",
        metrics.pam_sent.value(),
        metrics.nam_sent.value(),
        metrics.sol_sent.value(),
        metrics.parent_timeouts.value()
    );
}
