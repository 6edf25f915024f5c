//! Watch command implementation.
//!
//! Connects once and prints every snapshot as it arrives. The client never
//! reconnects on its own, so a dropped link ends the command with an error.

use anyhow::{Context, Result, anyhow, bail};
use tokio::sync::mpsc;
use vitals_core::{BleClient, BlePlatform, StatusEvent};
use vitals_types::{ConnectionStatus, VitalsSnapshot};

use crate::cli::OutputFormat;
use crate::format::{format_snapshot_text, format_status_text, to_json_line};

/// Arguments for the watch command.
pub struct WatchArgs {
    pub device: Option<String>,
    pub count: u64,
    pub format: OutputFormat,
    pub quiet: bool,
}

enum Update {
    Vitals(VitalsSnapshot),
    Status(StatusEvent),
}

pub async fn cmd_watch<P: BlePlatform + 'static>(
    client: &BleClient<P>,
    args: WatchArgs,
) -> Result<()> {
    let WatchArgs {
        device,
        count,
        format,
        quiet,
    } = args;

    let device = match device {
        Some(device) => device,
        None => strongest_device(client, quiet).await?,
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let vitals_tx = tx.clone();
    let mut vitals_sub = client.on_vitals_update(move |snapshot| {
        let _ = vitals_tx.send(Update::Vitals(*snapshot));
    });
    let mut status_sub = client.on_status_change(move |event| {
        let _ = tx.send(Update::Status(event.clone()));
    });

    if !quiet {
        eprintln!("Connecting to {}...", device);
    }
    client
        .connect(&device)
        .await
        .with_context(|| format!("Failed to connect to {}", device))?;
    if !quiet {
        eprintln!("Connected. Press Ctrl+C to stop.");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut printed: u64 = 0;

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            update = rx.recv() => match update {
                Some(Update::Vitals(snapshot)) => {
                    match format {
                        OutputFormat::Text => println!("{}", format_snapshot_text(&snapshot)),
                        OutputFormat::Json => println!("{}", to_json_line(&snapshot)?),
                    }
                    printed += 1;
                    if count > 0 && printed >= count {
                        if !quiet {
                            eprintln!("Completed {} snapshot(s).", printed);
                        }
                        break Ok(());
                    }
                }
                Some(Update::Status(event)) => {
                    if !quiet {
                        match format {
                            OutputFormat::Text => eprintln!("{}", format_status_text(&event)),
                            OutputFormat::Json => eprintln!("{}", to_json_line(&event)?),
                        }
                    }
                    match event.connection_status() {
                        Some(ConnectionStatus::Disconnected) => {
                            break Err(anyhow!("Sensor {} disconnected", device));
                        }
                        Some(ConnectionStatus::Error) => {
                            let cause = client.last_error().unwrap_or_else(|| "unknown".into());
                            break Err(anyhow!("Connection to {} lost: {}", device, cause));
                        }
                        _ => {}
                    }
                }
                None => break Ok(()),
            },
        }
    };

    vitals_sub.unsubscribe();
    status_sub.unsubscribe();
    client.disconnect().await;
    result
}

/// Scan and pick the sensor with the strongest signal.
async fn strongest_device<P: BlePlatform + 'static>(
    client: &BleClient<P>,
    quiet: bool,
) -> Result<String> {
    if !quiet {
        eprintln!("No device given, scanning...");
    }
    let devices = client
        .scan_for_devices()
        .await
        .context("Failed to scan for devices")?;

    let Some(device) = devices.into_iter().max_by_key(|d| d.rssi_dbm) else {
        bail!("No sensors found. Pass --device or set `device` in the config file.");
    };
    if !quiet {
        eprintln!("Using {} ({}, {} dBm)", device.name, device.id, device.rssi_dbm);
    }
    Ok(device.id)
}
