//! Latest-value store that merges the four vital channels into snapshots.

use time::OffsetDateTime;

use vitals_types::{ChannelPresence, ChannelValue, VitalsSnapshot, presence_from_distance};

/// Holds the last known value of every channel.
///
/// Every [`update`](Self::update) returns a freshly built [`VitalsSnapshot`];
/// the accumulator never waits for all four channels before producing one.
#[derive(Debug, Default)]
pub struct VitalsAccumulator {
    heart_rate_bpm: f32,
    breath_rate_bpm: f32,
    distance_cm: f32,
    signal_quality: u8,
    received: ChannelPresence,
    latest: Option<VitalsSnapshot>,
}

impl VitalsAccumulator {
    /// Create an accumulator with every channel at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the value for one channel and build a new snapshot.
    pub fn update(&mut self, value: ChannelValue) -> VitalsSnapshot {
        match value {
            ChannelValue::HeartRate(bpm) => self.heart_rate_bpm = bpm,
            ChannelValue::BreathRate(bpm) => self.breath_rate_bpm = bpm,
            ChannelValue::Distance(cm) => self.distance_cm = cm,
            ChannelValue::Status(record) => self.signal_quality = record.signal_quality,
        }
        self.received.insert(value.channel());
        let snapshot = self.build();
        self.latest = Some(snapshot);
        snapshot
    }

    /// The snapshot built by the most recent update, as handed to
    /// subscribers. `None` until a channel reports after a reset.
    pub fn latest(&self) -> Option<VitalsSnapshot> {
        self.latest
    }

    fn build(&self) -> VitalsSnapshot {
        VitalsSnapshot {
            heart_rate_bpm: self.heart_rate_bpm,
            breath_rate_bpm: self.breath_rate_bpm,
            distance_cm: self.distance_cm,
            signal_quality: self.signal_quality,
            presence_detected: presence_from_distance(self.distance_cm),
            timestamp_ms: now_ms(),
            received: self.received,
        }
    }

    /// Restore every channel to its default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
