//! Data publishing command implementation for the COMPAS CLI

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use log::info;
use rust_compas_common::ndn::{Data, Name};
use rust_compas_relay::{spawn_udp_relay, RelayConfig};
use std::path::Path;
use tokio::signal;

use crate::utils::{print_data, print_metrics};

/// Publish content from a relay and keep serving it until Ctrl+C
pub async fn publish_data(
    config_path: Option<&Path>,
    name_str: String,
    content: String,
    freshness: Option<u32>,
    bind: Option<String>,
) -> Result<()> {
    info!(
        "Publishing data: name={}, content_len={}, freshness={:?}",
        name_str,
        content.len(),
        freshness
    );

    let name: Name = name_str.parse().context("Invalid name")?;
    let mut config = RelayConfig::load(config_path).context("Failed to load configuration")?;
    if let Some(bind) = bind {
        config.link.bind = bind;
    }
    if !config.prefix().is_prefix_of(&name) {
        println!(
            "Note: {} is outside the DODAG prefix {} and will not be advertised",
            name, config.node.prefix
        );
    }

    let mut data = Data::new(name, Bytes::from(content));
    if let Some(ms) = freshness {
        data = data.with_freshness(ms);
    }

    let (handle, task) = spawn_udp_relay(config).await.context("Failed to start relay")?;
    if !handle.insert(data.clone()).await? {
        handle.shutdown().await?;
        bail!("Content store refused {}", data.name);
    }

    println!("Publishing Data:");
    print_data(&data);
    println!("Waiting for Interests (press Ctrl+C to exit)...");

    match signal::ctrl_c().await {
        Ok(()) => println!("Shutting down..."),
        Err(err) => eprintln!("Unable to listen for shutdown signal: {}", err),
    }

    handle.shutdown().await?;
    let relay = task.await.context("Relay task failed")?;
    print_metrics(&relay.metrics());

    Ok(())
}
