//! BLE telemetry client for radar vital-sign sensors.
//!
//! This crate connects to a radar sensor over a custom GATT service, decodes
//! its four notification streams (heart rate, breath rate, target distance
//! and a packed status record) and republishes one merged
//! [`VitalsSnapshot`] per update to any number of subscribers.
//!
//! # Features
//!
//! - **Device discovery**: Fixed-window scan with name filtering and
//!   deduplication by device id
//! - **Connection lifecycle**: Explicit state machine with typed errors and
//!   no hidden retries
//! - **Notification fan-in**: Four characteristic streams merged into one
//!   ordered update path
//! - **Partial snapshots**: Every channel update produces a snapshot, with
//!   [`ChannelPresence`](vitals_types::ChannelPresence) telling real zeros
//!   from missing channels
//! - **Fan-out**: Multiple independent subscribers per event stream
//! - **Testability**: [`MockPlatform`] scripts the radio for tests and demos
//!
//! # Platform Differences
//!
//! - **macOS**: Devices are identified by a CoreBluetooth UUID, stable per
//!   Mac but not the MAC address.
//! - **Linux/Windows**: Devices are identified by their Bluetooth MAC address
//!   (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use vitals_core::{BleClient, BtleplugPlatform, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let platform = BtleplugPlatform::new().await?;
//!     let client = BleClient::new(platform, ClientConfig::default());
//!     client.init().await?;
//!
//!     let devices = client.scan_for_devices().await?;
//!     let Some(device) = devices.first() else {
//!         return Ok(());
//!     };
//!
//!     client.on_vitals_update(|v| {
//!         println!("HR {:.0} bpm, BR {:.0} bpm, {:.0} cm", v.heart_rate_bpm, v.breath_rate_bpm, v.distance_cm);
//!     });
//!     client.connect(&device.id).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod accumulator;
pub mod btle;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod mock;
pub mod multiplexer;
pub mod observer;
pub mod platform;
pub mod state;

pub use accumulator::VitalsAccumulator;
pub use btle::BtleplugPlatform;
pub use client::BleClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use events::StatusEvent;
pub use mock::MockPlatform;
pub use multiplexer::{MultiplexerStats, NotificationMultiplexer};
pub use observer::{Observers, Subscription};
pub use platform::{
    Advertisement, BlePlatform, GattService, PlatformEvent, ScanFilter,
};
pub use state::{ConnectionEvent, ConnectionStateMachine, Transition};

// Re-export the shared data model.
pub use vitals_types;
pub use vitals_types::uuid;
pub use vitals_types::{
    AdapterState, ChannelValue, ConnectionStatus, DiscoveredDevice, StatusRecord, VitalChannel,
    VitalsSnapshot,
};
