//! Configuration display command for the COMPAS CLI

use anyhow::{Context, Result};
use rust_compas_relay::RelayConfig;
use std::path::Path;

/// Print the configuration a relay would run with
pub fn show(path: Option<&Path>) -> Result<()> {
    let config = RelayConfig::load(path).context("Failed to load configuration")?;
    let json = serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?;
    println!("{}", json);
    Ok(())
}
