//! The public client facade.
//!
//! [`BleClient`] owns one platform handle and drives the whole lifecycle:
//! scanning, connecting, service discovery, notification fan-in and teardown.
//! Applications construct it explicitly at their composition root and share
//! it by cloning (clones drive the same connection).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::StreamExt;
use indexmap::IndexMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use vitals_types::{
    AdapterState, ConnectionStatus, DiscoveredDevice, VitalChannel, VitalsSnapshot,
};

use crate::accumulator::VitalsAccumulator;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::events::StatusEvent;
use crate::multiplexer::{MultiplexerStats, NotificationMultiplexer, Sinks};
use crate::observer::{Observers, Subscription};
use crate::platform::{Advertisement, BlePlatform, PlatformEvent, PlatformEventStream};
use crate::state::{ConnectionEvent, ConnectionStateMachine, Transition};

const ADAPTER_OFF_CAUSE: &str = "Bluetooth adapter powered off";

/// Client for one radar vitals sensor at a time.
///
/// # Example
///
/// ```
/// use vitals_core::{BleClient, ClientConfig, MockPlatform};
/// use vitals_types::ConnectionStatus;
///
/// #[tokio::main]
/// async fn main() -> vitals_core::Result<()> {
///     let client = BleClient::new(MockPlatform::new(), ClientConfig::default());
///     client.init().await?;
///
///     let mut sub = client.on_vitals_update(|snapshot| {
///         println!("heart rate: {:.1} bpm", snapshot.heart_rate_bpm);
///     });
///
///     client.connect("AA:BB:CC:DD:EE:FF").await?;
///     assert_eq!(client.current_status(), ConnectionStatus::Connected);
///
///     sub.unsubscribe();
///     client.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct BleClient<P: BlePlatform + 'static> {
    inner: Arc<Inner<P>>,
}

impl<P: BlePlatform + 'static> Clone for BleClient<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: BlePlatform + 'static> std::fmt::Debug for BleClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleClient")
            .field("status", &self.current_status())
            .field("device", &self.connected_device())
            .finish_non_exhaustive()
    }
}

struct Inner<P> {
    platform: P,
    config: ClientConfig,
    state: Arc<Mutex<ConnectionStateMachine>>,
    accumulator: Arc<Mutex<VitalsAccumulator>>,
    vitals: Arc<Observers<VitalsSnapshot>>,
    status: Arc<Observers<StatusEvent>>,
    link: Mutex<Link>,
    watcher: Mutex<Option<Watcher>>,
}

/// Work in flight on the radio, torn down together by a disconnect.
#[derive(Default)]
struct Link {
    scan_stop: Option<CancellationToken>,
    pending: Option<PendingConnect>,
    session: Option<Session>,
}

struct PendingConnect {
    device_id: String,
    cancel: CancellationToken,
}

struct Session {
    device_id: String,
    multiplexer: Option<NotificationMultiplexer>,
}

struct Watcher {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P: BlePlatform + 'static> BleClient<P> {
    /// Create a client. Nothing touches the radio until a method is called.
    pub fn new(platform: P, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                platform,
                config,
                state: Arc::new(Mutex::new(ConnectionStateMachine::new())),
                accumulator: Arc::new(Mutex::new(VitalsAccumulator::new())),
                vitals: Arc::new(Observers::new()),
                status: Arc::new(Observers::new()),
                link: Mutex::new(Link::default()),
                watcher: Mutex::new(None),
            }),
        }
    }

    /// The platform this client drives.
    pub fn platform(&self) -> &P {
        &self.inner.platform
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Validate the configuration and start watching platform events
    /// (adapter power, peer disconnects). Calling it again is a no-op.
    pub async fn init(&self) -> Result<()> {
        self.inner.config.validate()?;

        if lock(&self.inner.watcher).is_some() {
            return Ok(());
        }

        let events = self.inner.platform.events().await?;
        let cancel = CancellationToken::new();

        let mut watcher = lock(&self.inner.watcher);
        if watcher.is_some() {
            return Ok(());
        }
        let task = tokio::spawn(watch_platform(
            Arc::downgrade(&self.inner),
            events,
            cancel.clone(),
        ));
        *watcher = Some(Watcher { cancel, task });
        debug!("Platform event watcher started");
        Ok(())
    }

    /// Disconnect if needed and stop the platform event watcher.
    pub async fn shutdown(&self) {
        self.disconnect().await;

        let watcher = lock(&self.inner.watcher).take();
        if let Some(watcher) = watcher {
            watcher.cancel.cancel();
            if let Err(e) = watcher.task.await {
                warn!("Platform event watcher ended abnormally: {}", e);
            }
        }
        info!("Client shut down");
    }

    /// Scan for sensors for the configured window and return every matching
    /// device seen, deduplicated by id.
    ///
    /// The full window always elapses unless [`stop_scan`](Self::stop_scan)
    /// or [`disconnect`](Self::disconnect) ends it early.
    #[instrument(skip(self), fields(window = ?self.inner.config.scan_duration))]
    pub async fn scan_for_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        let inner = &self.inner;
        inner.ensure_accepts(&ConnectionEvent::StartScan, "scan")?;
        inner.check_preconditions().await?;

        let stop = CancellationToken::new();
        let started = inner.transition_with(ConnectionEvent::StartScan, |link| {
            link.scan_stop = Some(stop.clone());
        });
        if started.is_none() {
            return Err(inner.invalid_state("scan"));
        }

        let filter = inner.config.scan_filter();
        let mut advertisements = match inner.platform.start_scan(filter).await {
            Ok(stream) => stream,
            Err(e) => {
                let err = match e.classify_platform() {
                    e @ (Error::PermissionDenied | Error::ScanFailed(_)) => e,
                    other => Error::ScanFailed(other.to_string()),
                };
                inner.clear_scan_stop(&stop);
                inner.transition(ConnectionEvent::Fault(err.to_string()));
                return Err(err);
            }
        };
        info!("Scanning for devices matching {:?}", inner.config.name_filter);

        let mut found: IndexMap<String, DiscoveredDevice> = IndexMap::new();
        let window = tokio::time::sleep(inner.config.scan_duration);
        tokio::pin!(window);
        let mut stream_open = true;

        loop {
            tokio::select! {
                _ = &mut window => break,
                _ = stop.cancelled() => {
                    debug!("Scan stopped early");
                    break;
                }
                next = advertisements.next(), if stream_open => match next {
                    Some(advertisement) => inner.record_advertisement(&mut found, advertisement),
                    None => {
                        debug!("Advertisement stream ended before the scan window");
                        stream_open = false;
                    }
                },
            }
        }
        drop(advertisements);

        if let Err(e) = inner.platform.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        inner.clear_scan_stop(&stop);

        if inner.transition(ConnectionEvent::ScanFinished).is_none() {
            let state = lock(&inner.state);
            if state.status() == ConnectionStatus::Error {
                let cause = state.last_error().unwrap_or("scan aborted").to_string();
                drop(state);
                warn!("Scan aborted: {}", cause);
                return Err(if cause == ADAPTER_OFF_CAUSE {
                    Error::AdapterOff
                } else {
                    Error::ScanFailed(cause)
                });
            }
        }

        let devices: Vec<DiscoveredDevice> = found.into_values().collect();
        info!("Scan finished, found {} device(s)", devices.len());
        Ok(devices)
    }

    /// End a running scan window now. Returns `false` if no scan was running.
    pub fn stop_scan(&self) -> bool {
        match lock(&self.inner.link).scan_stop.take() {
            Some(stop) => {
                stop.cancel();
                true
            }
            None => false,
        }
    }

    /// Connect to a device, discover the vitals service and start streaming.
    ///
    /// `Ok(())` means the status is `Connected`. On any error the status is
    /// `Error` (connect, discovery or precondition failure) or `Disconnected`
    /// (interrupted by [`disconnect`](Self::disconnect)), except for
    /// [`Error::InvalidState`] which leaves it untouched.
    #[instrument(skip(self))]
    pub async fn connect(&self, device_id: &str) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_accepts(&ConnectionEvent::Connect, "connect")?;
        inner.check_preconditions().await?;

        let cancel = CancellationToken::new();
        let started = inner.transition_with(ConnectionEvent::Connect, |link| {
            link.pending = Some(PendingConnect {
                device_id: device_id.to_string(),
                cancel: cancel.clone(),
            });
        });
        if started.is_none() {
            return Err(inner.invalid_state("connect"));
        }
        lock(&inner.accumulator).reset();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = inner.establish_link(device_id) => result,
        };

        // A cancelled attempt no longer owns the pending slot.
        if !cancel.is_cancelled() {
            lock(&inner.link).pending = None;
        }

        match outcome {
            Ok(()) => {}
            Err(Error::Cancelled) => {
                info!("Connection attempt to {} cancelled", device_id);
                return Err(Error::Cancelled);
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", device_id, e);
                inner.release_link(device_id).await;
                inner.transition(failure_event(&e));
                return Err(e);
            }
        }

        if !inner.establish_session(device_id) {
            info!("Connection to {} superseded before it completed", device_id);
            inner.release_link(device_id).await;
            return Err(Error::Cancelled);
        }

        let sinks = Sinks {
            accumulator: Arc::clone(&inner.accumulator),
            state: Arc::clone(&inner.state),
            vitals: Arc::clone(&inner.vitals),
            status: Arc::clone(&inner.status),
        };
        let multiplexer = match NotificationMultiplexer::start(
            &inner.platform,
            device_id,
            inner.config.service_uuid,
            sinks,
        )
        .await
        {
            Ok(multiplexer) => multiplexer,
            Err(e) => {
                warn!("Subscribing to {} failed: {}", device_id, e);
                let session = lock(&inner.link).session.take();
                if session.is_some() {
                    inner.release_link(device_id).await;
                    lock(&inner.accumulator).reset();
                    inner.transition(ConnectionEvent::Fault(e.to_string()));
                }
                return Err(e);
            }
        };

        let rejected = {
            let mut link = lock(&inner.link);
            match link.session.as_mut() {
                Some(session) if session.device_id == device_id => {
                    session.multiplexer = Some(multiplexer);
                    None
                }
                _ => Some(multiplexer),
            }
        };
        if let Some(mut multiplexer) = rejected {
            multiplexer.shutdown().await;
            return Err(Error::Cancelled);
        }

        info!("Connected to {}", device_id);
        Ok(())
    }

    /// Tear down everything in flight and end in `Disconnected`.
    ///
    /// Cancels a running scan or a pending connect, stops notifications,
    /// releases the link and resets the accumulator. Link release failures
    /// are logged, never returned.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.teardown().await;
        if inner.transition(ConnectionEvent::Disconnect).is_some() {
            info!("Disconnected");
        }
    }

    /// Register a callback for every new vitals snapshot.
    pub fn on_vitals_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&VitalsSnapshot) + Send + Sync + 'static,
    {
        self.inner.vitals.subscribe(callback)
    }

    /// Register a callback for status events: connection transitions,
    /// sensor status records and adapter power changes.
    pub fn on_status_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.inner.status.subscribe(callback)
    }

    /// The current connection status.
    pub fn current_status(&self) -> ConnectionStatus {
        lock(&self.inner.state).status()
    }

    /// Cause of the last transition into `Error`, while still in `Error`.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.state).last_error().map(str::to_string)
    }

    /// Identifier of the connected device.
    pub fn connected_device(&self) -> Option<String> {
        if self.current_status() != ConnectionStatus::Connected {
            return None;
        }
        lock(&self.inner.link)
            .session
            .as_ref()
            .map(|s| s.device_id.clone())
    }

    /// The most recent merged reading, once at least one channel has
    /// reported on the current connection.
    pub fn latest_snapshot(&self) -> Option<VitalsSnapshot> {
        if self.current_status() != ConnectionStatus::Connected {
            return None;
        }
        lock(&self.inner.accumulator).latest()
    }

    /// Notification counters for the current connection.
    pub fn multiplexer_stats(&self) -> Option<MultiplexerStats> {
        lock(&self.inner.link)
            .session
            .as_ref()
            .and_then(|s| s.multiplexer.as_ref())
            .map(NotificationMultiplexer::stats)
    }
}

impl<P: BlePlatform + 'static> Inner<P> {
    /// Apply an event and publish the transition, outside every lock.
    fn transition(&self, event: ConnectionEvent) -> Option<Transition> {
        self.transition_with(event, |_| {})
    }

    /// Like [`transition`](Self::transition), but also updates the link
    /// while the state lock is held, only if the transition was taken.
    fn transition_with(
        &self,
        event: ConnectionEvent,
        install: impl FnOnce(&mut Link),
    ) -> Option<Transition> {
        let transition = {
            let mut state = lock(&self.state);
            let transition = state.apply(event);
            if transition.is_some() {
                install(&mut lock(&self.link));
            }
            transition
        };
        if let Some(t) = &transition {
            self.publish(t);
        }
        transition
    }

    fn publish(&self, t: &Transition) {
        match &t.cause {
            Some(cause) => info!("Status {} -> {} ({})", t.from, t.to, cause),
            None => info!("Status {} -> {}", t.from, t.to),
        }
        self.status.emit(&StatusEvent::Connection {
            status: t.to,
            cause: t.cause.clone(),
        });
    }

    /// Release the scan slot unless a disconnect or `stop_scan` already
    /// took it, in which case it may hold a newer scan's token.
    fn clear_scan_stop(&self, stop: &CancellationToken) {
        if !stop.is_cancelled() {
            lock(&self.link).scan_stop = None;
        }
    }

    fn invalid_state(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            status: lock(&self.state).status(),
        }
    }

    fn ensure_accepts(&self, event: &ConnectionEvent, operation: &'static str) -> Result<()> {
        let state = lock(&self.state);
        if state.accepts(event) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                status: state.status(),
            })
        }
    }

    /// Permissions granted and adapter not powered off. A failure moves the
    /// client to `Error`.
    async fn check_preconditions(&self) -> Result<()> {
        let result = self.query_preconditions().await;
        if let Err(e) = &result {
            warn!("Precondition failed: {}", e);
            self.transition(ConnectionEvent::Fault(e.to_string()));
        }
        result
    }

    async fn query_preconditions(&self) -> Result<()> {
        let granted = self
            .platform
            .request_permissions()
            .await
            .map_err(Error::classify_platform)?;
        if !granted {
            return Err(Error::PermissionDenied);
        }

        match self
            .platform
            .adapter_state()
            .await
            .map_err(Error::classify_platform)?
        {
            AdapterState::PoweredOff => Err(Error::AdapterOff),
            AdapterState::PoweredOn => Ok(()),
            AdapterState::Unknown => {
                debug!("Adapter state unknown, proceeding");
                Ok(())
            }
        }
    }

    fn record_advertisement(
        &self,
        found: &mut IndexMap<String, DiscoveredDevice>,
        advertisement: Advertisement,
    ) {
        let Some(name) = advertisement.name else {
            return;
        };
        if !self.config.matches_name(&name) {
            return;
        }

        match found.get_mut(&advertisement.id) {
            Some(device) => {
                device.name = name;
                if let Some(rssi) = advertisement.rssi {
                    device.rssi_dbm = rssi;
                }
                device.is_connectable = advertisement.is_connectable;
            }
            None => {
                debug!(id = %advertisement.id, name = %name, rssi = ?advertisement.rssi, "Found device");
                found.insert(
                    advertisement.id.clone(),
                    DiscoveredDevice {
                        id: advertisement.id,
                        name,
                        rssi_dbm: advertisement.rssi.unwrap_or_default(),
                        is_connectable: advertisement.is_connectable,
                    },
                );
            }
        }
    }

    /// Link up and verify the vitals service, each step under its timeout.
    async fn establish_link(&self, device_id: &str) -> Result<()> {
        let connect_timeout = self.config.connect_timeout;
        match tokio::time::timeout(connect_timeout, self.platform.connect(device_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e @ Error::ConnectFailed { .. })) => return Err(e),
            Ok(Err(e)) => return Err(Error::connect_failed(device_id, e.to_string())),
            Err(_) => return Err(Error::timeout("connect", connect_timeout)),
        }
        debug!("Link to {} is up, discovering services", device_id);

        let discovery_timeout = self.config.discovery_timeout;
        let services = match tokio::time::timeout(
            discovery_timeout,
            self.platform.discover_services(device_id),
        )
        .await
        {
            Ok(Ok(services)) => services,
            Ok(Err(e @ Error::DiscoveryFailed { .. })) => return Err(e),
            Ok(Err(e)) => return Err(Error::discovery_failed(device_id, e.to_string())),
            Err(_) => return Err(Error::timeout("discover_services", discovery_timeout)),
        };

        let service_uuid = self.config.service_uuid;
        let service = services
            .iter()
            .find(|s| s.uuid == service_uuid)
            .ok_or_else(|| {
                Error::discovery_failed(device_id, format!("service {service_uuid} not found"))
            })?;

        let missing: Vec<String> = VitalChannel::ALL
            .iter()
            .filter(|c| !service.has_characteristic(c.characteristic_uuid()))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::discovery_failed(
                device_id,
                format!("missing characteristics: {}", missing.join(", ")),
            ));
        }

        Ok(())
    }

    /// Move to `Connected` and record the session in one step. Returns
    /// `false` if the attempt was cancelled or faulted in the meantime.
    fn establish_session(&self, device_id: &str) -> bool {
        self.transition_with(ConnectionEvent::Established, |link| {
            link.session = Some(Session {
                device_id: device_id.to_string(),
                multiplexer: None,
            });
        })
        .is_some()
    }

    /// Best-effort release of the radio link.
    async fn release_link(&self, device_id: &str) {
        if let Err(e) = self.platform.cancel_connection(device_id).await {
            warn!("Failed to release link to {}: {}", device_id, e);
        }
    }

    /// Cancel the scan and any pending connect, stop notifications, release
    /// the link and reset the accumulator. Leaves the state untouched.
    async fn teardown(&self) {
        let link = std::mem::take(&mut *lock(&self.link));
        self.release(link).await;
    }

    async fn release(&self, link: Link) {
        let Link {
            scan_stop,
            pending,
            session,
        } = link;

        if let Some(stop) = scan_stop {
            stop.cancel();
        }

        let mut device = None;
        if let Some(pending) = pending {
            pending.cancel.cancel();
            device = Some(pending.device_id);
        }
        if let Some(mut session) = session {
            if let Some(multiplexer) = session.multiplexer.as_mut() {
                multiplexer.shutdown().await;
            }
            device = Some(session.device_id);
        }

        if let Some(device) = device {
            self.release_link(&device).await;
        }
        lock(&self.accumulator).reset();
    }

    async fn handle_platform_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::DeviceDisconnected(device_id) => {
                let is_session = lock(&self.link)
                    .session
                    .as_ref()
                    .is_some_and(|s| s.device_id == device_id);
                if !is_session {
                    debug!("Ignoring disconnect of {}", device_id);
                    return;
                }

                info!("{}: {}", device_id, Error::DisconnectedByPeer);
                let session = lock(&self.link).session.take();
                if let Some(mut multiplexer) = session.and_then(|s| s.multiplexer) {
                    multiplexer.shutdown().await;
                }
                lock(&self.accumulator).reset();
                self.transition(ConnectionEvent::PeerDisconnected);
            }
            PlatformEvent::AdapterStateChanged(state) => {
                info!("Bluetooth adapter {}", state);
                self.status.emit(&StatusEvent::Adapter { state });

                if state != AdapterState::PoweredOff {
                    return;
                }

                // Enter `Error` before cancelling anything, so an interrupted
                // scan or connect observes the fault when it wakes.
                let faulted = {
                    let mut machine = lock(&self.state);
                    if matches!(
                        machine.status(),
                        ConnectionStatus::Disconnected | ConnectionStatus::Error
                    ) {
                        None
                    } else {
                        machine
                            .apply(ConnectionEvent::Fault(ADAPTER_OFF_CAUSE.to_string()))
                            .map(|t| (t, std::mem::take(&mut *lock(&self.link))))
                    }
                };
                if let Some((transition, link)) = faulted {
                    self.release(link).await;
                    self.publish(&transition);
                }
            }
        }
    }
}

/// State-machine event for a failed link-up.
fn failure_event(error: &Error) -> ConnectionEvent {
    match error {
        Error::DiscoveryFailed { .. } => ConnectionEvent::DiscoveryFailed(error.to_string()),
        Error::Timeout { operation, .. } if operation == "discover_services" => {
            ConnectionEvent::DiscoveryFailed(error.to_string())
        }
        _ => ConnectionEvent::ConnectFailed(error.to_string()),
    }
}

async fn watch_platform<P: BlePlatform + 'static>(
    inner: Weak<Inner<P>>,
    mut events: PlatformEventStream,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.next() => match event {
                Some(event) => event,
                None => {
                    debug!("Platform event stream ended");
                    break;
                }
            },
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_platform_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_failure_event_mapping() {
        let e = Error::discovery_failed("dev", "service missing");
        assert!(matches!(
            failure_event(&e),
            ConnectionEvent::DiscoveryFailed(_)
        ));

        let e = Error::timeout("discover_services", Duration::from_secs(10));
        assert!(matches!(
            failure_event(&e),
            ConnectionEvent::DiscoveryFailed(_)
        ));

        let e = Error::timeout("connect", Duration::from_secs(15));
        assert!(matches!(failure_event(&e), ConnectionEvent::ConnectFailed(_)));

        let e = Error::connect_failed("dev", "refused");
        match failure_event(&e) {
            ConnectionEvent::ConnectFailed(cause) => {
                assert_eq!(cause, "Connection to dev failed: refused")
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
