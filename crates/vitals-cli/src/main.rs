//! `vitals`: scan for radar vital-sign sensors and stream their readings.

mod cli;
mod commands;
mod config;
mod format;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vitals_core::{BleClient, BtleplugPlatform};

use crate::cli::{Cli, Commands};
use crate::commands::{WatchArgs, cmd_scan, cmd_watch};
use crate::config::{Config, resolve_device};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        // `config --set-device` may create the file.
        Some(path) if !path.exists() && matches!(cli.command, Commands::Config { .. }) => {
            Config::default()
        }
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    // Flags win, then RUST_LOG, then the config file.
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(config.log_level.as_deref().unwrap_or("info"))
                .unwrap_or_else(|_| EnvFilter::new("info"))
        })
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (scan_secs, connect_timeout_secs) = match &cli.command {
        Commands::Scan { timeout } => (*timeout, None),
        Commands::Watch {
            connect_timeout, ..
        } => (None, *connect_timeout),
        Commands::Config { .. } => (None, None),
    };
    let client_config =
        config.client_config(cli.name_filter.as_deref(), scan_secs, connect_timeout_secs);

    if let Commands::Config { set_device } = &cli.command {
        let path = cli.config.clone().unwrap_or_else(Config::path);
        if let Some(device) = set_device {
            config.device = Some(device.clone());
            config.save_to(&path)?;
            println!("saved device {} to {}", device, path.display());
        }
        println!("config file: {}", path.display());
        println!("device: {}", config.device.as_deref().unwrap_or("(none)"));
        println!("name filter: {:?}", client_config.name_filter);
        println!("scan window: {:?}", client_config.scan_duration);
        println!("connect timeout: {:?}", client_config.connect_timeout);
        return Ok(());
    }

    let platform = BtleplugPlatform::new()
        .await
        .context("Failed to open the Bluetooth adapter")?;
    let client = BleClient::new(platform, client_config);
    client.init().await.context("Failed to start the client")?;

    let result = match cli.command {
        Commands::Scan { .. } => cmd_scan(&client, cli.format, cli.quiet).await,
        Commands::Watch { device, count, .. } => {
            cmd_watch(
                &client,
                WatchArgs {
                    device: resolve_device(device, &config),
                    count,
                    format: cli.format,
                    quiet: cli.quiet,
                },
            )
            .await
        }
        Commands::Config { .. } => Ok(()),
    };

    client.shutdown().await;
    result
}
