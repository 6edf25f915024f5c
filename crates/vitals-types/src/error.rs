//! Error types for payload decoding in vitals-types.

use thiserror::Error;

/// Errors that can occur when decoding a characteristic payload.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in vitals-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload does not have the length its channel requires.
    #[error("Bad payload length: expected {expected} bytes, got {actual}")]
    BadLength {
        /// Required number of bytes (exact for floats, minimum for status records).
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },
}

/// Result type alias using vitals-types' DecodeError type.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_length_display() {
        let err = DecodeError::BadLength {
            expected: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Bad payload length: expected 4 bytes, got 3"
        );
    }
}
