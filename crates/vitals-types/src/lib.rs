//! Platform-agnostic types for radar vital-sign sensors.
//!
//! This crate provides the data model, GATT UUID constants and binary
//! payload decoders shared by the BLE client (vitals-core) and any other
//! consumer of the sensor's wire format.
//!
//! # Features
//!
//! - Connection status and device discovery types
//! - Vital channel identifiers mapped to characteristic UUIDs
//! - Little-endian float and packed status record decoders
//! - Merged vitals snapshot with derived presence detection
//!
//! # Example
//!
//! ```
//! use vitals_types::{decode_notification, ChannelValue, VitalChannel};
//!
//! let value = decode_notification(VitalChannel::HeartRate, &64.0f32.to_le_bytes()).unwrap();
//! assert_eq!(value, ChannelValue::HeartRate(64.0));
//! ```

pub mod decode;
pub mod error;
pub mod types;
pub mod uuid;

pub use decode::{decode_float32_le, decode_notification, decode_status_record};
pub use error::{DecodeError, DecodeResult};
pub use types::{
    AdapterState, ChannelPresence, ChannelValue, ConnectionStatus, DiscoveredDevice,
    PRESENCE_MAX_DISTANCE_CM, RawNotification, StatusRecord, VitalChannel, VitalsSnapshot,
    presence_from_distance,
};
pub use uuid as uuids;
