//! Interest sending command implementation for the COMPAS CLI

use anyhow::{Context, Result};
use log::{debug, info};
use rust_compas_common::{
    ndn::{InterestOptions, Name},
    Error,
};
use rust_compas_relay::{spawn_udp_relay, RelayConfig};
use std::{path::Path, time::Duration};

use crate::utils::{print_data, print_metrics, Timer};

/// Join the link as a short-lived node, send an Interest and print the Data
pub async fn send_interest(
    config_path: Option<&Path>,
    name_str: String,
    timeout_ms: u64,
    prefix: bool,
    bind: String,
) -> Result<()> {
    info!("Sending Interest: name={}, timeout={}ms", name_str, timeout_ms);

    let name: Name = name_str.parse().context("Invalid name")?;
    let mut config = RelayConfig::load(config_path).context("Failed to load configuration")?;
    config.node.root = false;
    config.link.bind = bind;

    let (handle, task) = spawn_udp_relay(config).await.context("Failed to start relay")?;
    let mut waiter = handle.subscribe();

    println!("Sending Interest: {}", name);
    println!("Timeout: {}ms", timeout_ms);

    let timer = Timer::new("interest");
    let opts = InterestOptions {
        lifetime_ms: u32::try_from(timeout_ms).unwrap_or(u32::MAX),
        can_be_prefix: prefix,
        ..Default::default()
    };
    let outcome = handle.send_interest(name.clone(), opts).await?;
    debug!("Interest outcome: {:?}", outcome);

    let timeout = Duration::from_millis(timeout_ms);
    let reply = if prefix {
        waiter.next(timeout).await.map(|delivery| delivery.data)
    } else {
        waiter.wait_for(&name, timeout).await
    };

    match reply {
        Ok(data) => {
            println!("\nReceived Data after {}:", timer.elapsed_str());
            print_data(&data);
        }
        Err(Error::Timeout) => println!("Timeout after {}ms", timeout_ms),
        Err(e) => println!("Error retrieving data: {}", e),
    }

    handle.shutdown().await?;
    let relay = task.await.context("Relay task failed")?;
    print_metrics(&relay.metrics());

    Ok(())
}
