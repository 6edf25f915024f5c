//! Stateless decoders for characteristic payloads.
//!
//! Decoders never sanitise numeric ranges: a negative distance or a NaN heart
//! rate is passed through exactly as the sensor sent it.

use crate::error::{DecodeError, DecodeResult};
use crate::types::{ChannelValue, FLOAT_PAYLOAD_BYTES, StatusRecord, VitalChannel};

/// Decode exactly four bytes as an IEEE-754 little-endian `f32`.
///
/// # Examples
///
/// ```
/// use vitals_types::decode_float32_le;
///
/// assert_eq!(decode_float32_le(&72.5f32.to_le_bytes()), Ok(72.5));
/// assert!(decode_float32_le(&[0x00, 0x00, 0x80]).is_err());
/// ```
///
/// # Errors
///
/// Returns [`DecodeError::BadLength`] unless `data` is exactly four bytes long.
pub fn decode_float32_le(data: &[u8]) -> DecodeResult<f32> {
    let bytes: [u8; FLOAT_PAYLOAD_BYTES] =
        data.try_into().map_err(|_| DecodeError::BadLength {
            expected: FLOAT_PAYLOAD_BYTES,
            actual: data.len(),
        })?;
    Ok(f32::from_le_bytes(bytes))
}

/// Decode a packed status record. See [`StatusRecord::from_bytes`].
///
/// # Errors
///
/// Returns [`DecodeError::BadLength`] if `data` is shorter than ten bytes.
pub fn decode_status_record(data: &[u8]) -> DecodeResult<StatusRecord> {
    StatusRecord::from_bytes(data)
}

/// Decode a payload with the decoder matching its channel.
///
/// # Errors
///
/// Propagates the [`DecodeError`] of the underlying decoder.
pub fn decode_notification(channel: VitalChannel, data: &[u8]) -> DecodeResult<ChannelValue> {
    match channel {
        VitalChannel::HeartRate => decode_float32_le(data).map(ChannelValue::HeartRate),
        VitalChannel::BreathRate => decode_float32_le(data).map(ChannelValue::BreathRate),
        VitalChannel::Distance => decode_float32_le(data).map(ChannelValue::Distance),
        VitalChannel::Status => decode_status_record(data).map(ChannelValue::Status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // --- Float decoding ---

    #[test]
    fn test_decode_float_known_bytes() {
        // 72.0 = 0x42900000
        assert_eq!(decode_float32_le(&[0x00, 0x00, 0x90, 0x42]), Ok(72.0));
        // -1.5 = 0xBFC00000
        assert_eq!(decode_float32_le(&[0x00, 0x00, 0xC0, 0xBF]), Ok(-1.5));
    }

    #[test]
    fn test_decode_float_rejects_wrong_lengths() {
        for len in [0usize, 1, 3, 5, 8] {
            let data = vec![0u8; len];
            assert_eq!(
                decode_float32_le(&data),
                Err(DecodeError::BadLength {
                    expected: 4,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn test_decode_float_passes_nan_through() {
        let value = decode_float32_le(&f32::NAN.to_le_bytes()).unwrap();
        assert!(value.is_nan());
    }

    // --- Status record decoding ---

    #[test]
    fn test_decode_status_record_reference_payload() {
        // uptime bytes [0, 0, 0, 60] LE = 60 << 24 = 0x3C00_0000 = 1_006_632_960
        // update count bytes [5, 0] LE = 5
        let record = decode_status_record(&[1, 1, 72, 0, 0, 0, 0, 60, 5, 0]).unwrap();

        assert_eq!(
            record,
            StatusRecord {
                sensor_ready: true,
                data_valid: true,
                signal_quality: 72,
                uptime_seconds: 1_006_632_960,
                update_count: 5,
            }
        );
    }

    #[test]
    fn test_decode_status_record_mixed_fields() {
        let bytes = [
            0, // not ready
            2, // non-zero counts as valid
            100, 0xEE, // reserved byte is ignored
            0x10, 0x0E, 0x00, 0x00, // uptime = 3600
            0x34, 0x12, // update count = 0x1234
        ];
        let record = decode_status_record(&bytes).unwrap();

        assert!(!record.sensor_ready);
        assert!(record.data_valid);
        assert_eq!(record.signal_quality, 100);
        assert_eq!(record.uptime_seconds, 3600);
        assert_eq!(record.update_count, 0x1234);
    }

    #[test]
    fn test_decode_status_record_extra_bytes_ignored() {
        let bytes = [1, 0, 50, 0, 1, 0, 0, 0, 2, 0, 0xAA, 0xBB];
        let record = decode_status_record(&bytes).unwrap();
        assert_eq!(record.uptime_seconds, 1);
        assert_eq!(record.update_count, 2);
    }

    #[test]
    fn test_decode_status_record_too_short() {
        let err = decode_status_record(&[1, 1, 72, 0, 0, 0, 0, 60, 5]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::BadLength {
                expected: 10,
                actual: 9
            }
        );
    }

    // --- Dispatch ---

    #[test]
    fn test_decode_notification_dispatch() {
        let bytes = 36.6f32.to_le_bytes();
        assert_eq!(
            decode_notification(VitalChannel::BreathRate, &bytes),
            Ok(ChannelValue::BreathRate(36.6))
        );
        assert_eq!(
            decode_notification(VitalChannel::Distance, &bytes),
            Ok(ChannelValue::Distance(36.6))
        );
        assert!(matches!(
            decode_notification(VitalChannel::Status, &bytes),
            Err(DecodeError::BadLength {
                expected: 10,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_decode_notification_heart_rate_short_payload() {
        assert_eq!(
            decode_notification(VitalChannel::HeartRate, &[1, 2, 3]),
            Err(DecodeError::BadLength {
                expected: 4,
                actual: 3
            })
        );
    }

    proptest! {
        #[test]
        fn prop_float_roundtrip(x in any::<f32>().prop_filter("finite", |v| v.is_finite())) {
            prop_assert_eq!(decode_float32_le(&x.to_le_bytes()), Ok(x));
        }

        #[test]
        fn prop_short_status_payload_fails(data in proptest::collection::vec(any::<u8>(), 0..10)) {
            let len = data.len();
            prop_assert_eq!(
                decode_status_record(&data),
                Err(DecodeError::BadLength { expected: 10, actual: len })
            );
        }

        #[test]
        fn prop_non_four_byte_float_fails(data in proptest::collection::vec(any::<u8>(), 0..16)) {
            prop_assume!(data.len() != 4);
            prop_assert!(decode_float32_le(&data).is_err());
        }
    }
}
