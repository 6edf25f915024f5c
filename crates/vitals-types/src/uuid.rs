//! Bluetooth UUIDs for the radar vitals sensor.
//!
//! The sensor exposes one primary GATT service carrying four notifiable
//! characteristics, one per vital channel.

use uuid::{Uuid, uuid};

// --- Vitals Service UUID ---

/// Primary service grouping the four vitals characteristics.
pub const VITALS_SERVICE: Uuid = uuid!("4fafc201-1fb5-459e-8fcc-c5c9c331914b");

// --- Vitals Characteristic UUIDs ---

/// Heart rate in beats per minute (f32 LE, 4 bytes).
pub const HEART_RATE: Uuid = uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a8");

/// Breath rate in breaths per minute (f32 LE, 4 bytes).
pub const BREATH_RATE: Uuid = uuid!("beb5483f-36e1-4688-b7f5-ea07361b26a8");

/// Subject distance in centimetres (f32 LE, 4 bytes).
pub const DISTANCE: Uuid = uuid!("beb54840-36e1-4688-b7f5-ea07361b26a8");

/// Packed sensor status record (at least 10 bytes).
pub const STATUS: Uuid = uuid!("beb54841-36e1-4688-b7f5-ea07361b26a8");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vitals_service_uuid() {
        assert_eq!(
            VITALS_SERVICE.to_string(),
            "4fafc201-1fb5-459e-8fcc-c5c9c331914b"
        );
    }

    #[test]
    fn test_characteristic_uuids_are_distinct() {
        let all = [HEART_RATE, BREATH_RATE, DISTANCE, STATUS];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
            assert_ne!(*a, VITALS_SERVICE);
        }
    }

    #[test]
    fn test_characteristics_share_base() {
        for uuid in [HEART_RATE, BREATH_RATE, DISTANCE, STATUS] {
            assert!(
                uuid.to_string().ends_with("-36e1-4688-b7f5-ea07361b26a8"),
                "UUID {} should share the vitals characteristic base",
                uuid
            );
        }
    }
}
