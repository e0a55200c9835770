use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod utils;

/// COMPAS Command Line Interface
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Sets the level of verbosity
    #[clap(short, long, global = true)]
    verbose: bool,

    /// Configuration file (TOML); COMPAS__* variables override it
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the link, request a name and print the reply
    Interest {
        /// Name to request (NDN URI format)
        name: String,

        /// Timeout in milliseconds
        #[clap(short, long, default_value = "4000")]
        timeout: u64,

        /// Accept any content under the name
        #[clap(long)]
        prefix: bool,

        /// Address to bind, defaults to an ephemeral port
        #[clap(short, long, default_value = "0.0.0.0:0")]
        bind: String,
    },

    /// Publish content and serve it until interrupted
    Publish {
        /// Name to publish under (NDN URI format)
        name: String,

        /// Content to publish (string)
        content: String,

        /// Freshness period in milliseconds
        #[clap(short, long)]
        freshness: Option<u32>,

        /// Address to bind, overrides link.bind
        #[clap(short, long)]
        bind: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "debug" } else { "info" }
    )).init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Interest { name, timeout, prefix, bind } => {
            commands::interest::send_interest(config, name, timeout, prefix, bind).await?;
        }
        Commands::Publish { name, content, freshness, bind } => {
            commands::publish::publish_data(config, name, content, freshness, bind).await?;
        }
        Commands::Config => {
            commands::config::show(config)?;
        }
    }

    Ok(())
}
