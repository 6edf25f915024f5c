//! Scriptable platform for testing.
//!
//! This module provides a [`MockPlatform`] that stands in for the Bluetooth
//! stack so the client can be exercised without BLE hardware.
//!
//! # Features
//!
//! - **Scripted scans**: queue advertisements delivered when a scan starts,
//!   or push more while it runs
//! - **Failure injection**: deny permissions, power the adapter off, fail
//!   scans, connects or subscriptions
//! - **Live notifications**: push raw payloads on any vitals channel
//! - **Platform events**: simulate peer disconnects and adapter power changes
//!
//! `MockPlatform` is cheaply cloneable; every clone drives the same state, so
//! a test keeps one clone after handing another to the client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{self, UnboundedSender};
use uuid::Uuid;

use vitals_types::{AdapterState, VitalChannel};

use crate::error::{Error, Result};
use crate::platform::{
    Advertisement, AdvertisementStream, BlePlatform, GattService, PlatformEvent,
    PlatformEventStream, ScanFilter, ValueStream,
};
use crate::uuid::VITALS_SERVICE;

#[derive(Default)]
struct MockState {
    permissions_denied: AtomicBool,
    adapter_state: Mutex<Option<AdapterState>>,
    advertisements: Mutex<Vec<Advertisement>>,
    scan_failure: Mutex<Option<String>>,
    scan_tx: Mutex<Option<UnboundedSender<Advertisement>>>,
    last_scan_filter: Mutex<Option<ScanFilter>>,
    connect_failure: Mutex<Option<String>>,
    connect_latency: Mutex<Duration>,
    permission_latency: Mutex<Duration>,
    services: Mutex<Option<Vec<GattService>>>,
    subscribe_failure: Mutex<Option<Uuid>>,
    monitors: Mutex<HashMap<Uuid, UnboundedSender<Vec<u8>>>>,
    event_txs: Mutex<Vec<UnboundedSender<PlatformEvent>>>,
    connected: Mutex<Option<String>>,
    scan_count: AtomicU32,
    connect_count: AtomicU32,
    cancel_count: AtomicU32,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock BLE platform for testing.
///
/// # Example
///
/// ```
/// use vitals_core::{BlePlatform, MockPlatform};
/// use vitals_types::AdapterState;
///
/// #[tokio::main]
/// async fn main() {
///     let platform = MockPlatform::new();
///     assert_eq!(platform.adapter_state().await.unwrap(), AdapterState::PoweredOn);
///
///     platform.set_adapter_state(AdapterState::PoweredOff);
///     assert_eq!(platform.adapter_state().await.unwrap(), AdapterState::PoweredOff);
/// }
/// ```
#[derive(Clone, Default)]
pub struct MockPlatform {
    state: Arc<MockState>,
}

impl std::fmt::Debug for MockPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPlatform")
            .field("connected", &*lock(&self.state.connected))
            .field("monitors", &lock(&self.state.monitors).len())
            .finish()
    }
}

impl MockPlatform {
    /// Create a platform with permissions granted, the adapter on, and a
    /// device exposing the full vitals service.
    pub fn new() -> Self {
        Self::default()
    }

    /// The vitals service with all four characteristics.
    pub fn vitals_service() -> GattService {
        GattService {
            uuid: VITALS_SERVICE,
            characteristics: VitalChannel::ALL
                .iter()
                .map(|c| c.characteristic_uuid())
                .collect(),
        }
    }

    // --- Scripting ---

    /// Grant or deny runtime permissions.
    pub fn set_permissions_granted(&self, granted: bool) {
        self.state
            .permissions_denied
            .store(!granted, Ordering::SeqCst);
    }

    /// Change the adapter power state and notify event listeners.
    pub fn set_adapter_state(&self, state: AdapterState) {
        *lock(&self.state.adapter_state) = Some(state);
        self.emit(PlatformEvent::AdapterStateChanged(state));
    }

    /// Queue an advertisement delivered at the start of every scan.
    pub fn add_advertisement(&self, advertisement: Advertisement) {
        lock(&self.state.advertisements).push(advertisement);
    }

    /// Deliver an advertisement to the scan in progress.
    ///
    /// Returns `false` if no scan is running.
    pub fn advertise(&self, advertisement: Advertisement) -> bool {
        lock(&self.state.scan_tx)
            .as_ref()
            .is_some_and(|tx| tx.unbounded_send(advertisement).is_ok())
    }

    /// Make the next scans fail to start.
    pub fn fail_scan(&self, reason: Option<&str>) {
        *lock(&self.state.scan_failure) = reason.map(str::to_string);
    }

    /// Make connects fail with a reason, or succeed again with `None`.
    pub fn fail_connect(&self, reason: Option<&str>) {
        *lock(&self.state.connect_failure) = reason.map(str::to_string);
    }

    /// Delay every permission request by `latency`.
    pub fn set_permission_latency(&self, latency: Duration) {
        *lock(&self.state.permission_latency) = latency;
    }

    /// Delay every connect by `latency`.
    pub fn set_connect_latency(&self, latency: Duration) {
        *lock(&self.state.connect_latency) = latency;
    }

    /// Replace the services reported by discovery.
    pub fn set_services(&self, services: Vec<GattService>) {
        *lock(&self.state.services) = Some(services);
    }

    /// Make subscribing to a characteristic fail.
    pub fn fail_subscribe(&self, characteristic: Option<Uuid>) {
        *lock(&self.state.subscribe_failure) = characteristic;
    }

    /// Push a raw payload on a channel.
    ///
    /// Returns `false` if nothing is monitoring the channel.
    pub fn notify(&self, channel: VitalChannel, payload: impl Into<Vec<u8>>) -> bool {
        lock(&self.state.monitors)
            .get(&channel.characteristic_uuid())
            .is_some_and(|tx| tx.unbounded_send(payload.into()).is_ok())
    }

    /// Simulate the connected peripheral dropping the link.
    pub fn disconnect_peer(&self) {
        let device = lock(&self.state.connected).take();
        lock(&self.state.monitors).clear();
        if let Some(device) = device {
            self.emit(PlatformEvent::DeviceDisconnected(device));
        }
    }

    // --- Inspection ---

    /// Device currently linked, if any.
    pub fn connected_device(&self) -> Option<String> {
        lock(&self.state.connected).clone()
    }

    /// Number of characteristics currently monitored.
    pub fn monitored_count(&self) -> usize {
        lock(&self.state.monitors).len()
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        lock(&self.state.scan_tx).is_some()
    }

    /// Filter passed to the most recent `start_scan`.
    pub fn last_scan_filter(&self) -> Option<ScanFilter> {
        lock(&self.state.last_scan_filter).clone()
    }

    /// Number of `start_scan` calls.
    pub fn scan_count(&self) -> u32 {
        self.state.scan_count.load(Ordering::SeqCst)
    }

    /// Number of `connect` calls.
    pub fn connect_count(&self) -> u32 {
        self.state.connect_count.load(Ordering::SeqCst)
    }

    /// Number of `cancel_connection` calls.
    pub fn cancel_count(&self) -> u32 {
        self.state.cancel_count.load(Ordering::SeqCst)
    }

    fn emit(&self, event: PlatformEvent) {
        lock(&self.state.event_txs).retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}

#[async_trait]
impl BlePlatform for MockPlatform {
    async fn request_permissions(&self) -> Result<bool> {
        let latency = *lock(&self.state.permission_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(!self.state.permissions_denied.load(Ordering::SeqCst))
    }

    async fn adapter_state(&self) -> Result<AdapterState> {
        Ok(lock(&self.state.adapter_state).unwrap_or(AdapterState::PoweredOn))
    }

    async fn start_scan(&self, filter: ScanFilter) -> Result<AdvertisementStream> {
        self.state.scan_count.fetch_add(1, Ordering::SeqCst);
        *lock(&self.state.last_scan_filter) = Some(filter);
        if let Some(reason) = lock(&self.state.scan_failure).clone() {
            return Err(Error::ScanFailed(reason));
        }

        let (tx, rx) = mpsc::unbounded();
        for advertisement in lock(&self.state.advertisements).iter() {
            let _ = tx.unbounded_send(advertisement.clone());
        }
        *lock(&self.state.scan_tx) = Some(tx);
        Ok(rx.boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        lock(&self.state.scan_tx).take();
        Ok(())
    }

    async fn connect(&self, device_id: &str) -> Result<()> {
        self.state.connect_count.fetch_add(1, Ordering::SeqCst);

        let latency = *lock(&self.state.connect_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(reason) = lock(&self.state.connect_failure).clone() {
            return Err(Error::connect_failed(device_id, reason));
        }
        *lock(&self.state.connected) = Some(device_id.to_string());
        Ok(())
    }

    async fn discover_services(&self, device_id: &str) -> Result<Vec<GattService>> {
        if lock(&self.state.connected).as_deref() != Some(device_id) {
            return Err(Error::discovery_failed(device_id, "not connected"));
        }
        Ok(lock(&self.state.services)
            .clone()
            .unwrap_or_else(|| vec![Self::vitals_service()]))
    }

    async fn monitor_characteristic(
        &self,
        device_id: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<ValueStream> {
        if *lock(&self.state.subscribe_failure) == Some(characteristic) {
            return Err(Error::discovery_failed(
                device_id,
                format!("notifications refused for {characteristic}"),
            ));
        }

        let (tx, rx) = mpsc::unbounded();
        lock(&self.state.monitors).insert(characteristic, tx);
        Ok(rx.boxed())
    }

    async fn cancel_connection(&self, _device_id: &str) -> Result<()> {
        self.state.cancel_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.monitors).clear();
        lock(&self.state.connected).take();
        Ok(())
    }

    async fn events(&self) -> Result<PlatformEventStream> {
        let (tx, rx) = mpsc::unbounded();
        lock(&self.state.event_txs).push(tx);
        Ok(rx.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertisement(id: &str, name: &str) -> Advertisement {
        Advertisement {
            id: id.to_string(),
            name: Some(name.to_string()),
            rssi: Some(-60),
            is_connectable: true,
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let platform = MockPlatform::new();
        assert!(platform.request_permissions().await.unwrap());
        assert_eq!(
            platform.adapter_state().await.unwrap(),
            AdapterState::PoweredOn
        );
        assert!(platform.connected_device().is_none());
    }

    #[tokio::test]
    async fn test_scan_delivers_queued_and_live_advertisements() {
        let platform = MockPlatform::new();
        platform.add_advertisement(advertisement("A", "Vitals A"));

        let mut scan = platform.start_scan(ScanFilter::default()).await.unwrap();
        assert!(platform.advertise(advertisement("B", "Vitals B")));

        assert_eq!(scan.next().await.unwrap().id, "A");
        assert_eq!(scan.next().await.unwrap().id, "B");

        platform.stop_scan().await.unwrap();
        assert!(scan.next().await.is_none());
        assert!(!platform.advertise(advertisement("C", "Vitals C")));
        assert_eq!(platform.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_and_monitor() {
        let platform = MockPlatform::new();
        platform.connect("dev").await.unwrap();

        let services = platform.discover_services("dev").await.unwrap();
        assert_eq!(services, vec![MockPlatform::vitals_service()]);

        let uuid = VitalChannel::Distance.characteristic_uuid();
        let mut values = platform
            .monitor_characteristic("dev", VITALS_SERVICE, uuid)
            .await
            .unwrap();

        assert!(platform.notify(VitalChannel::Distance, vec![1, 2, 3, 4]));
        assert!(!platform.notify(VitalChannel::HeartRate, vec![0; 4]));
        assert_eq!(values.next().await.unwrap(), vec![1, 2, 3, 4]);

        platform.cancel_connection("dev").await.unwrap();
        assert!(values.next().await.is_none());
        assert_eq!(platform.cancel_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let platform = MockPlatform::new();

        platform.fail_connect(Some("out of range"));
        let err = platform.connect("dev").await.unwrap_err();
        assert!(err.to_string().contains("out of range"));

        platform.fail_scan(Some("busy"));
        assert!(matches!(
            platform.start_scan(ScanFilter::default()).await,
            Err(Error::ScanFailed(_))
        ));

        assert!(matches!(
            platform.discover_services("dev").await,
            Err(Error::DiscoveryFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_peer_disconnect_event() {
        let platform = MockPlatform::new();
        let mut events = platform.events().await.unwrap();
        platform.connect("dev").await.unwrap();

        platform.disconnect_peer();
        assert_eq!(
            events.next().await.unwrap(),
            PlatformEvent::DeviceDisconnected("dev".into())
        );

        platform.set_adapter_state(AdapterState::PoweredOff);
        assert_eq!(
            events.next().await.unwrap(),
            PlatformEvent::AdapterStateChanged(AdapterState::PoweredOff)
        );
    }
}
