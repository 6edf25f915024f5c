//! Fan-in of the four vitals characteristic streams.
//!
//! One notification stream per [`VitalChannel`] is merged with
//! [`select_all`], which polls the streams fairly so a silent channel never
//! holds up the others. A single drain task decodes each notification,
//! merges it into the [`VitalsAccumulator`] and fans the resulting snapshot
//! out to subscribers, so the accumulator has exactly one writer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use futures::stream::{BoxStream, select_all};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use vitals_types::{
    ChannelValue, ConnectionStatus, RawNotification, VitalChannel, VitalsSnapshot,
    decode_notification,
};

use crate::accumulator::VitalsAccumulator;
use crate::error::{Error, Result};
use crate::events::StatusEvent;
use crate::observer::Observers;
use crate::platform::BlePlatform;
use crate::state::ConnectionStateMachine;

/// Notification counters for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiplexerStats {
    /// Notifications decoded and merged.
    pub processed: u64,
    /// Notifications dropped because they failed to decode.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    dropped: AtomicU64,
}

/// Where decoded notifications go.
#[derive(Clone)]
pub(crate) struct Sinks {
    pub accumulator: Arc<Mutex<VitalsAccumulator>>,
    pub state: Arc<Mutex<ConnectionStateMachine>>,
    pub vitals: Arc<Observers<VitalsSnapshot>>,
    pub status: Arc<Observers<StatusEvent>>,
}

impl Sinks {
    fn is_connected(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
            == ConnectionStatus::Connected
    }

    fn update(&self, value: ChannelValue) -> VitalsSnapshot {
        self.accumulator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(value)
    }
}

/// Running subscription to all four vitals characteristics.
///
/// Dropping the multiplexer cancels its drain task; [`shutdown`](Self::shutdown)
/// additionally waits for the task to finish.
pub struct NotificationMultiplexer {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for NotificationMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationMultiplexer")
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

impl NotificationMultiplexer {
    /// Subscribe to every channel on `device_id` and start draining.
    ///
    /// Fails if any subscription fails; subscriptions made before the
    /// failure are dropped with the partial stream set.
    pub(crate) async fn start<P>(
        platform: &P,
        device_id: &str,
        service: Uuid,
        sinks: Sinks,
    ) -> Result<Self>
    where
        P: BlePlatform + ?Sized,
    {
        let mut streams: Vec<BoxStream<'static, RawNotification>> =
            Vec::with_capacity(VitalChannel::ALL.len());

        for channel in VitalChannel::ALL {
            let values = platform
                .monitor_characteristic(device_id, service, channel.characteristic_uuid())
                .await
                .map_err(|e| {
                    Error::discovery_failed(
                        device_id,
                        format!("failed to subscribe to {channel}: {e}"),
                    )
                })?;
            debug!("Subscribed to {} notifications", channel);
            streams.push(
                values
                    .map(move |payload| RawNotification::new(channel, payload))
                    .boxed(),
            );
        }

        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let task = tokio::spawn(drain(
            select_all(streams),
            sinks,
            Arc::clone(&counters),
            cancel.clone(),
        ));

        Ok(Self {
            cancel,
            task: Some(task),
            counters,
        })
    }

    /// Notification counters so far.
    pub fn stats(&self) -> MultiplexerStats {
        MultiplexerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Whether the drain task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop draining and wait for the task to exit.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("Notification task ended abnormally: {}", e);
        }
    }
}

impl Drop for NotificationMultiplexer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drain(
    mut notifications: futures::stream::SelectAll<BoxStream<'static, RawNotification>>,
    sinks: Sinks,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Notification task cancelled");
                break;
            }
            next = notifications.next() => match next {
                Some(notification) => handle_notification(&sinks, &counters, notification),
                None => {
                    debug!("All notification streams ended");
                    break;
                }
            },
        }
    }
}

fn handle_notification(sinks: &Sinks, counters: &Counters, notification: RawNotification) {
    let RawNotification { channel, payload } = notification;

    let value = match decode_notification(channel, &payload) {
        Ok(value) => value,
        Err(e) => {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                channel = %channel,
                len = payload.len(),
                error = %e,
                "Dropping malformed notification"
            );
            return;
        }
    };
    counters.processed.fetch_add(1, Ordering::Relaxed);

    let snapshot = sinks.update(value);
    debug!(channel = %channel, ?value, "Merged notification");

    if !sinks.is_connected() {
        return;
    }
    sinks.vitals.emit(&snapshot);

    if let ChannelValue::Status(record) = value {
        sinks.status.emit(&StatusEvent::Sensor {
            record,
            signal_quality: record.signal_quality,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConnectionEvent;

    fn sinks(connected: bool) -> (Sinks, Arc<Mutex<Vec<VitalsSnapshot>>>) {
        let mut machine = ConnectionStateMachine::new();
        if connected {
            machine.apply(ConnectionEvent::Connect);
            machine.apply(ConnectionEvent::Established);
        }
        let sinks = Sinks {
            accumulator: Arc::new(Mutex::new(VitalsAccumulator::new())),
            state: Arc::new(Mutex::new(machine)),
            vitals: Arc::new(Observers::new()),
            status: Arc::new(Observers::new()),
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sinks
            .vitals
            .subscribe(move |s: &VitalsSnapshot| sink.lock().unwrap().push(*s));
        (sinks, seen)
    }

    #[test]
    fn test_decode_failure_is_isolated() {
        let (sinks, seen) = sinks(true);
        let counters = Counters::default();

        handle_notification(
            &sinks,
            &counters,
            RawNotification::new(VitalChannel::HeartRate, vec![0x00, 0x00, 0x90]),
        );
        handle_notification(
            &sinks,
            &counters,
            RawNotification::new(VitalChannel::BreathRate, 14.5f32.to_le_bytes()),
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].breath_rate_bpm, 14.5);
        assert_eq!(seen[0].heart_rate_bpm, 0.0);
        assert_eq!(counters.dropped.load(Ordering::Relaxed), 1);
        assert_eq!(counters.processed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_no_snapshots_unless_connected() {
        let (sinks, seen) = sinks(false);
        let counters = Counters::default();

        handle_notification(
            &sinks,
            &counters,
            RawNotification::new(VitalChannel::Distance, 120.0f32.to_le_bytes()),
        );

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(counters.processed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_status_channel_emits_sensor_event() {
        let (sinks, _seen) = sinks(true);
        let counters = Counters::default();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        sinks
            .status
            .subscribe(move |e: &StatusEvent| sink.lock().unwrap().push(e.clone()));

        handle_notification(
            &sinks,
            &counters,
            RawNotification::new(VitalChannel::Status, vec![1, 0, 55, 0, 10, 0, 0, 0, 2, 0]),
        );

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            StatusEvent::Sensor {
                record,
                signal_quality,
            } => {
                assert_eq!(*signal_quality, 55);
                assert!(record.sensor_ready);
                assert!(!record.data_valid);
                assert_eq!(record.uptime_seconds, 10);
                assert_eq!(record.update_count, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
