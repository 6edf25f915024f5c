//! Core types for radar vitals data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Upper bound (exclusive) of the distance band that counts as presence, in cm.
pub const PRESENCE_MAX_DISTANCE_CM: f32 = 300.0;

/// Number of bytes in a packed status record.
pub const STATUS_RECORD_BYTES: usize = 10;

/// Number of bytes in a float channel payload.
pub const FLOAT_PAYLOAD_BYTES: usize = 4;

/// Lifecycle state of the BLE connection.
///
/// Exactly one status is active at a time; it only changes through
/// connection state machine transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConnectionStatus {
    /// Idle, no link and no scan in progress.
    #[default]
    Disconnected,
    /// A scan window is running.
    Scanning,
    /// Link establishment or service discovery is in progress.
    Connecting,
    /// Link up, services discovered, notifications flowing.
    Connected,
    /// A link-level, discovery-level or adapter-level failure occurred.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Scanning => write!(f, "scanning"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// Power state of the local Bluetooth adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AdapterState {
    /// Adapter is on and usable.
    PoweredOn,
    /// Adapter is off; scanning and connecting are blocked.
    PoweredOff,
    /// The platform could not report a state.
    Unknown,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::PoweredOn => write!(f, "powered on"),
            AdapterState::PoweredOff => write!(f, "powered off"),
            AdapterState::Unknown => write!(f, "unknown"),
        }
    }
}

/// A device seen during one scan window.
///
/// Devices are deduplicated by `id` and are not kept after the scan ends.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscoveredDevice {
    /// Platform identifier used to connect (MAC address, or a UUID on macOS).
    pub id: String,
    /// Advertised local name.
    pub name: String,
    /// Received signal strength in dBm.
    pub rssi_dbm: i16,
    /// Whether the advertisement is connectable.
    pub is_connectable: bool,
}

/// One of the four vital-sign data streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum VitalChannel {
    /// Heart rate, beats per minute.
    HeartRate,
    /// Breath rate, breaths per minute.
    BreathRate,
    /// Subject distance, centimetres.
    Distance,
    /// Packed sensor status record.
    Status,
}

impl VitalChannel {
    /// All channels, in subscription order.
    pub const ALL: [VitalChannel; 4] = [
        VitalChannel::HeartRate,
        VitalChannel::BreathRate,
        VitalChannel::Distance,
        VitalChannel::Status,
    ];

    /// Returns the characteristic UUID carrying this channel.
    ///
    /// # Examples
    ///
    /// ```
    /// use vitals_types::{VitalChannel, uuids};
    ///
    /// assert_eq!(VitalChannel::HeartRate.characteristic_uuid(), uuids::HEART_RATE);
    /// assert_eq!(VitalChannel::Status.characteristic_uuid(), uuids::STATUS);
    /// ```
    #[must_use]
    pub fn characteristic_uuid(&self) -> uuid::Uuid {
        match self {
            VitalChannel::HeartRate => crate::uuid::HEART_RATE,
            VitalChannel::BreathRate => crate::uuid::BREATH_RATE,
            VitalChannel::Distance => crate::uuid::DISTANCE,
            VitalChannel::Status => crate::uuid::STATUS,
        }
    }

    /// Look up the channel carried by a characteristic UUID.
    #[must_use]
    pub fn from_characteristic(uuid: uuid::Uuid) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.characteristic_uuid() == uuid)
    }
}

impl fmt::Display for VitalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VitalChannel::HeartRate => write!(f, "heart rate"),
            VitalChannel::BreathRate => write!(f, "breath rate"),
            VitalChannel::Distance => write!(f, "distance"),
            VitalChannel::Status => write!(f, "status"),
        }
    }
}

/// A raw characteristic notification, consumed immediately by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    /// Channel the payload arrived on.
    pub channel: VitalChannel,
    /// Undecoded payload bytes.
    pub payload: Vec<u8>,
}

impl RawNotification {
    /// Create a new raw notification.
    pub fn new(channel: VitalChannel, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }
}

/// Sensor status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusRecord {
    /// Sensor has finished warming up.
    pub sensor_ready: bool,
    /// The current measurements are trustworthy.
    pub data_valid: bool,
    /// Signal quality, nominally 0-100.
    pub signal_quality: u8,
    /// Seconds since the sensor booted.
    pub uptime_seconds: u32,
    /// Rolling count of measurement updates.
    pub update_count: u16,
}

impl StatusRecord {
    /// Parse a `StatusRecord` from raw bytes.
    ///
    /// The byte format is:
    /// - byte 0: Sensor ready (non-zero = true)
    /// - byte 1: Data valid (non-zero = true)
    /// - byte 2: Signal quality (u8)
    /// - byte 3: Reserved
    /// - bytes 4-7: Uptime in seconds (u32 LE)
    /// - bytes 8-9: Update count (u16 LE)
    ///
    /// Bytes beyond the tenth are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::BadLength`] if `data` contains fewer than
    /// [`STATUS_RECORD_BYTES`] (10) bytes.
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        use bytes::Buf;

        if data.len() < STATUS_RECORD_BYTES {
            return Err(DecodeError::BadLength {
                expected: STATUS_RECORD_BYTES,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let sensor_ready = buf.get_u8() != 0;
        let data_valid = buf.get_u8() != 0;
        let signal_quality = buf.get_u8();
        buf.advance(1);
        let uptime_seconds = buf.get_u32_le();
        let update_count = buf.get_u16_le();

        Ok(StatusRecord {
            sensor_ready,
            data_valid,
            signal_quality,
            uptime_seconds,
            update_count,
        })
    }
}

/// A decoded payload, tagged with the channel it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "channel", content = "value", rename_all = "snake_case"))]
pub enum ChannelValue {
    HeartRate(f32),
    BreathRate(f32),
    Distance(f32),
    Status(StatusRecord),
}

impl ChannelValue {
    /// The channel this value belongs to.
    pub fn channel(&self) -> VitalChannel {
        match self {
            ChannelValue::HeartRate(_) => VitalChannel::HeartRate,
            ChannelValue::BreathRate(_) => VitalChannel::BreathRate,
            ChannelValue::Distance(_) => VitalChannel::Distance,
            ChannelValue::Status(_) => VitalChannel::Status,
        }
    }
}

/// Which channels have delivered at least one value in the current session.
///
/// Snapshot fields for channels that have not arrived yet read as zero; this
/// set tells a genuine zero apart from a missing reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelPresence {
    pub heart_rate: bool,
    pub breath_rate: bool,
    pub distance: bool,
    pub status: bool,
}

impl ChannelPresence {
    /// Whether the given channel has been received.
    pub fn contains(&self, channel: VitalChannel) -> bool {
        match channel {
            VitalChannel::HeartRate => self.heart_rate,
            VitalChannel::BreathRate => self.breath_rate,
            VitalChannel::Distance => self.distance,
            VitalChannel::Status => self.status,
        }
    }

    /// Mark a channel as received.
    pub fn insert(&mut self, channel: VitalChannel) {
        match channel {
            VitalChannel::HeartRate => self.heart_rate = true,
            VitalChannel::BreathRate => self.breath_rate = true,
            VitalChannel::Distance => self.distance = true,
            VitalChannel::Status => self.status = true,
        }
    }

    /// True once all four channels have reported.
    pub fn is_complete(&self) -> bool {
        VitalChannel::ALL.iter().all(|c| self.contains(*c))
    }

    /// True while no channel has reported.
    pub fn is_empty(&self) -> bool {
        !VitalChannel::ALL.iter().any(|c| self.contains(*c))
    }
}

/// Merged view of the latest value on every channel.
///
/// A new snapshot is built on every channel update; it is never mutated in
/// place after being handed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VitalsSnapshot {
    /// Heart rate in beats per minute (0 until received).
    pub heart_rate_bpm: f32,
    /// Breath rate in breaths per minute (0 until received).
    pub breath_rate_bpm: f32,
    /// Subject distance in centimetres (0 until received).
    pub distance_cm: f32,
    /// Signal quality from the last status record (0 until received).
    pub signal_quality: u8,
    /// Derived from `distance_cm`, see [`presence_from_distance`].
    pub presence_detected: bool,
    /// Build time, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Channels that have reported in this session.
    pub received: ChannelPresence,
}

/// Presence is detected iff the subject is strictly between 0 and 300 cm.
///
/// # Examples
///
/// ```
/// use vitals_types::presence_from_distance;
///
/// assert!(presence_from_distance(150.0));
/// assert!(!presence_from_distance(0.0));
/// assert!(!presence_from_distance(300.0));
/// ```
#[must_use]
pub fn presence_from_distance(distance_cm: f32) -> bool {
    distance_cm > 0.0 && distance_cm < PRESENCE_MAX_DISTANCE_CM
}
