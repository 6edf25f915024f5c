//! Hardware integration tests for vitals-core
//!
//! These tests require a powered radar sensor in range and should be run with:
//! ```
//! cargo test --package vitals-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Set `RADAR_VITALS_DEVICE` to the device identifier (MAC address, or the
//! CoreBluetooth UUID on macOS). Scan-only tests run without it.
//!
//! Example:
//! ```
//! RADAR_VITALS_DEVICE="AA:BB:CC:DD:EE:FF" cargo test --package vitals-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;

use vitals_core::{BleClient, BtleplugPlatform, ClientConfig, ConnectionStatus, VitalsSnapshot};

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Get device identifier from environment
fn get_device() -> Option<String> {
    env::var("RADAR_VITALS_DEVICE")
        .ok()
        .filter(|s| !s.is_empty())
}

async fn hardware_client() -> BleClient<BtleplugPlatform> {
    let platform = BtleplugPlatform::new()
        .await
        .expect("no usable Bluetooth adapter");
    let client = BleClient::new(platform, ClientConfig::default());
    client.init().await.expect("client init failed");
    client
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_devices() {
    let client = hardware_client().await;

    let result = timeout(BLE_TIMEOUT, client.scan_for_devices()).await;
    let devices = match result {
        Ok(Ok(devices)) => devices,
        Ok(Err(e)) => panic!("Scan failed: {}", e),
        Err(_) => panic!("Scan timed out after {:?}", BLE_TIMEOUT),
    };

    println!("Found {} device(s)", devices.len());
    for device in &devices {
        println!("  {} ({}) {} dBm", device.name, device.id, device.rssi_dbm);
    }
    assert_eq!(client.current_status(), ConnectionStatus::Disconnected);

    let mut ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), devices.len(), "scan returned duplicate ids");
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_and_stream() {
    let Some(device) = get_device() else {
        println!("RADAR_VITALS_DEVICE not set, skipping");
        return;
    };
    let client = hardware_client().await;

    // The platform only knows peripherals it has seen advertising.
    client.scan_for_devices().await.expect("scan failed");

    let snapshots: Arc<Mutex<Vec<VitalsSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    let mut sub = client.on_vitals_update(move |s| sink.lock().unwrap().push(*s));

    match timeout(BLE_TIMEOUT, client.connect(&device)).await {
        Ok(Ok(())) => println!("Connected to {}", device),
        Ok(Err(e)) => panic!("Failed to connect to {}: {}", device, e),
        Err(_) => panic!("Connection timed out after {:?}", BLE_TIMEOUT),
    }
    assert_eq!(client.current_status(), ConnectionStatus::Connected);

    tokio::time::sleep(Duration::from_secs(10)).await;

    {
        let snapshots = snapshots.lock().unwrap();
        println!("Received {} snapshot(s)", snapshots.len());
        if let Some(last) = snapshots.last() {
            println!(
                "  HR {:.1} bpm, BR {:.1} bpm, distance {:.1} cm, quality {}, presence {}",
                last.heart_rate_bpm,
                last.breath_rate_bpm,
                last.distance_cm,
                last.signal_quality,
                last.presence_detected
            );
        }
        assert!(!snapshots.is_empty(), "no notifications within 10s");
    }

    sub.unsubscribe();
    client.disconnect().await;
    assert_eq!(client.current_status(), ConnectionStatus::Disconnected);
    assert!(client.latest_snapshot().is_none());
}
