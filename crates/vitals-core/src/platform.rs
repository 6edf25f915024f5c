//! The BLE central-role capability the client is built on.
//!
//! This module provides the [`BlePlatform`] trait that abstracts over the
//! real Bluetooth stack ([`BtleplugPlatform`](crate::BtleplugPlatform)) and
//! the scriptable [`MockPlatform`](crate::MockPlatform) used in tests.
//!
//! Streams returned by the platform are `'static` so the client can move them
//! into background tasks; a stream ending means the platform stopped
//! producing items (scan stopped, link gone, adapter dropped).

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use vitals_types::AdapterState;

use crate::error::Result;

/// One advertisement seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Platform identifier of the advertiser.
    pub id: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
    /// Whether the advertiser accepts connections.
    pub is_connectable: bool,
}

/// Scan filter passed to [`BlePlatform::start_scan`].
///
/// Platforms may ignore `services` (some stacks do not filter reliably); the
/// client re-checks names itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub services: Vec<Uuid>,
}

/// A discovered GATT service and its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

impl GattService {
    /// Whether the service carries a characteristic.
    pub fn has_characteristic(&self, uuid: Uuid) -> bool {
        self.characteristics.contains(&uuid)
    }
}

/// Asynchronous platform notifications not tied to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The adapter changed power state.
    AdapterStateChanged(AdapterState),
    /// A connected peripheral dropped its link.
    DeviceDisconnected(String),
}

/// Stream of advertisements from a running scan.
pub type AdvertisementStream = BoxStream<'static, Advertisement>;

/// Stream of raw characteristic values.
pub type ValueStream = BoxStream<'static, Vec<u8>>;

/// Stream of platform events.
pub type PlatformEventStream = BoxStream<'static, PlatformEvent>;

/// BLE central-role operations consumed by the client.
///
/// # Example
///
/// ```ignore
/// use vitals_core::{BleClient, BlePlatform, ClientConfig};
///
/// async fn run<P: BlePlatform + 'static>(platform: P) -> vitals_core::Result<()> {
///     let client = BleClient::new(platform, ClientConfig::default());
///     client.init().await?;
///     let devices = client.scan_for_devices().await?;
///     println!("found {}", devices.len());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait BlePlatform: Send + Sync {
    /// Whether the runtime permissions needed for scanning and connecting are
    /// granted. Platforms without a permission model return `Ok(true)`.
    async fn request_permissions(&self) -> Result<bool>;

    /// Current adapter power state.
    async fn adapter_state(&self) -> Result<AdapterState>;

    /// Start scanning and return the advertisement stream.
    async fn start_scan(&self, filter: ScanFilter) -> Result<AdvertisementStream>;

    /// Stop a running scan.
    async fn stop_scan(&self) -> Result<()>;

    /// Establish the physical link to a device.
    async fn connect(&self, device_id: &str) -> Result<()>;

    /// Discover services and characteristics on a connected device.
    async fn discover_services(&self, device_id: &str) -> Result<Vec<GattService>>;

    /// Enable notifications on a characteristic and return its value stream.
    async fn monitor_characteristic(
        &self,
        device_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<ValueStream>;

    /// Release the link to a device.
    async fn cancel_connection(&self, device_id: &str) -> Result<()>;

    /// Adapter state changes and peer disconnects.
    async fn events(&self) -> Result<PlatformEventStream>;
}
