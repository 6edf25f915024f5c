//! Scan command implementation.

use anyhow::{Context, Result};
use vitals_core::{BleClient, BlePlatform};

use crate::cli::OutputFormat;
use crate::format::{format_scan_text, to_json_line};

pub async fn cmd_scan<P: BlePlatform + 'static>(
    client: &BleClient<P>,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    if !quiet {
        eprintln!(
            "Scanning for {:?} sensors ({}s)...",
            client.config().name_filter,
            client.config().scan_duration.as_secs()
        );
    }

    let devices = client
        .scan_for_devices()
        .await
        .context("Failed to scan for devices")?;

    match format {
        OutputFormat::Text => print!("{}", format_scan_text(&devices)),
        OutputFormat::Json => println!("{}", to_json_line(&devices)?),
    }
    Ok(())
}
