//! [`BlePlatform`] backed by the host Bluetooth stack through btleplug.
//!
//! # Device identifiers
//!
//! - **macOS**: CoreBluetooth hides MAC addresses and reports
//!   `00:00:00:00:00:00`; the peripheral UUID is used instead.
//! - **Linux/Windows**: the Bluetooth MAC address (e.g. `AA:BB:CC:DD:EE:FF`).
//!
//! btleplug has no runtime-permission API; on desktop platforms the OS
//! prompts on first use and a refusal surfaces as
//! `btleplug::Error::PermissionDenied`, which the client reports as
//! [`Error::PermissionDenied`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter as BtleScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vitals_types::AdapterState;

use crate::error::{Error, Result};
use crate::platform::{
    Advertisement, AdvertisementStream, BlePlatform, GattService, PlatformEvent,
    PlatformEventStream, ScanFilter, ValueStream,
};

/// Peripherals seen on this adapter, keyed by identifier.
type KnownPeripherals = Arc<Mutex<HashMap<String, Peripheral>>>;

/// The host Bluetooth adapter.
pub struct BtleplugPlatform {
    adapter: Adapter,
    known: KnownPeripherals,
    /// Characteristics subscribed per device, unsubscribed on cancel.
    subscriptions: Mutex<HashMap<String, Vec<Characteristic>>>,
}

impl std::fmt::Debug for BtleplugPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugPlatform").finish_non_exhaustive()
    }
}

impl BtleplugPlatform {
    /// Use the first Bluetooth adapter on the host.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;

        let adapter = adapters.into_iter().next().ok_or_else(|| {
            warn!("No Bluetooth adapter found");
            Error::AdapterOff
        })?;

        if let Ok(info) = adapter.adapter_info().await {
            info!("Using Bluetooth adapter {}", info);
        }
        Ok(Self::from_adapter(adapter))
    }

    /// Wrap an adapter obtained elsewhere.
    pub fn from_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            known: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Find a peripheral by identifier, first among those seen while
    /// scanning, then among everything the adapter knows about.
    async fn peripheral(&self, device_id: &str) -> Result<Peripheral> {
        if let Some(peripheral) = lock(&self.known).get(device_id).cloned() {
            return Ok(peripheral);
        }

        let wanted = device_id.to_lowercase();
        for peripheral in self.adapter.peripherals().await? {
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };
            let identifier =
                peripheral_identifier(&properties.address.to_string(), &peripheral.id());
            if identifier.to_lowercase() == wanted {
                debug!("Matched {} among adapter peripherals", identifier);
                lock(&self.known).insert(identifier, peripheral.clone());
                return Ok(peripheral);
            }
        }

        Err(Error::connect_failed(
            device_id,
            "device not known to the adapter; scan first",
        ))
    }
}

#[async_trait]
impl BlePlatform for BtleplugPlatform {
    async fn request_permissions(&self) -> Result<bool> {
        Ok(true)
    }

    async fn adapter_state(&self) -> Result<AdapterState> {
        Ok(map_central_state(self.adapter.adapter_state().await?))
    }

    async fn start_scan(&self, filter: ScanFilter) -> Result<AdvertisementStream> {
        let events = self.adapter.events().await?;
        self.adapter
            .start_scan(BtleScanFilter {
                services: filter.services,
            })
            .await?;

        let adapter = self.adapter.clone();
        let known = Arc::clone(&self.known);

        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            let known = Arc::clone(&known);
            async move {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => return None,
                };
                let peripheral = adapter.peripheral(&id).await.ok()?;
                let properties = peripheral.properties().await.ok().flatten()?;
                let identifier = peripheral_identifier(&properties.address.to_string(), &id);

                lock(&known).insert(identifier.clone(), peripheral);

                Some(Advertisement {
                    id: identifier,
                    name: properties.local_name,
                    rssi: properties.rssi,
                    // btleplug does not expose the advertisement type.
                    is_connectable: true,
                })
            }
        });

        Ok(stream.boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, device_id: &str) -> Result<()> {
        let peripheral = self.peripheral(device_id).await?;
        peripheral.connect().await?;
        Ok(())
    }

    async fn discover_services(&self, device_id: &str) -> Result<Vec<GattService>> {
        let peripheral = self.peripheral(device_id).await?;
        peripheral.discover_services().await?;

        let services: Vec<GattService> = peripheral
            .services()
            .into_iter()
            .map(|service| {
                debug!("  Service: {}", service.uuid);
                GattService {
                    uuid: service.uuid,
                    characteristics: service
                        .characteristics
                        .iter()
                        .map(|c| {
                            debug!("    Characteristic: {}", c.uuid);
                            c.uuid
                        })
                        .collect(),
                }
            })
            .collect();

        debug!("Found {} services", services.len());
        Ok(services)
    }

    async fn monitor_characteristic(
        &self,
        device_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<ValueStream> {
        let peripheral = self.peripheral(device_id).await?;

        let target = peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics.into_iter())
            .find(|c| c.uuid == characteristic)
            .ok_or_else(|| {
                Error::discovery_failed(
                    device_id,
                    format!("characteristic {characteristic} not found in service {service}"),
                )
            })?;

        peripheral.subscribe(&target).await?;
        lock(&self.subscriptions)
            .entry(device_id.to_string())
            .or_default()
            .push(target);

        let notifications = peripheral.notifications().await?;
        let stream = notifications.filter_map(move |notification| async move {
            (notification.uuid == characteristic).then_some(notification.value)
        });
        Ok(stream.boxed())
    }

    async fn cancel_connection(&self, device_id: &str) -> Result<()> {
        let peripheral = self.peripheral(device_id).await?;

        let subscribed = lock(&self.subscriptions)
            .remove(device_id)
            .unwrap_or_default();
        for characteristic in &subscribed {
            if let Err(e) = peripheral.unsubscribe(characteristic).await {
                debug!(
                    characteristic = %characteristic.uuid,
                    error = %e,
                    "Unsubscribe failed (link may already be down)"
                );
            }
        }

        peripheral.disconnect().await?;
        Ok(())
    }

    async fn events(&self) -> Result<PlatformEventStream> {
        let events = self.adapter.events().await?;
        let known = Arc::clone(&self.known);

        let stream = events.filter_map(move |event| {
            let known = Arc::clone(&known);
            async move {
                match event {
                    CentralEvent::StateUpdate(state) => {
                        Some(PlatformEvent::AdapterStateChanged(map_central_state(state)))
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        Some(PlatformEvent::DeviceDisconnected(known_identifier(&known, &id)))
                    }
                    _ => None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn map_central_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

/// Identifier previously recorded for a peripheral id, falling back to the
/// formatted id itself.
fn known_identifier(known: &KnownPeripherals, id: &PeripheralId) -> String {
    lock(known)
        .iter()
        .find(|(_, peripheral)| peripheral.id() == *id)
        .map(|(identifier, _)| identifier.clone())
        .unwrap_or_else(|| format_peripheral_id(id))
}

/// Format a peripheral ID as a bare string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Connection identifier: the MAC address, or the peripheral ID where the
/// platform hides addresses behind `00:00:00:00:00:00`.
pub fn peripheral_identifier(address: &str, id: &PeripheralId) -> String {
    if is_hidden_address(address) {
        format_peripheral_id(id)
    } else {
        address.to_string()
    }
}

fn is_hidden_address(address: &str) -> bool {
    address == "00:00:00:00:00:00"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_address() {
        assert!(is_hidden_address("00:00:00:00:00:00"));
        assert!(!is_hidden_address("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_central_state_mapping() {
        assert_eq!(
            map_central_state(CentralState::PoweredOn),
            AdapterState::PoweredOn
        );
        assert_eq!(
            map_central_state(CentralState::PoweredOff),
            AdapterState::PoweredOff
        );
        assert_eq!(map_central_state(CentralState::Unknown), AdapterState::Unknown);
    }
}
