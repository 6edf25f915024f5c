//! Error types for vitals-core.
//!
//! This module defines all error types that can occur while scanning for,
//! connecting to, and streaming from a radar vitals sensor.
//!
//! # Propagation
//!
//! | Error Type | Surfaces as | Connection state afterwards |
//! |------------|-------------|-----------------------------|
//! | [`Error::PermissionDenied`] | `Err` from scan/connect | `Error` |
//! | [`Error::AdapterOff`] | `Err` from scan/connect | `Error` |
//! | [`Error::ScanFailed`] | `Err` from scan | `Error` |
//! | [`Error::ConnectFailed`] | `Err` from connect | `Error` |
//! | [`Error::DiscoveryFailed`] | `Err` from connect | `Error` |
//! | [`Error::Decode`] | never returned; logged and dropped | unchanged |
//! | [`Error::DisconnectedByPeer`] | status event | `Disconnected` |
//! | [`Error::Cancelled`] | `Err` from a connect interrupted by disconnect | `Disconnected` |
//! | [`Error::InvalidState`] | `Err`, operation not started | unchanged |
//!
//! The client never retries on its own; callers re-invoke `connect()`.

use std::time::Duration;

use thiserror::Error;

use vitals_types::{ConnectionStatus, DecodeError};

/// Errors that can occur when talking to a radar vitals sensor.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the platform stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Required runtime permissions were not granted.
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    /// The Bluetooth adapter is powered off or unavailable.
    #[error("Bluetooth adapter is off")]
    AdapterOff,

    /// The scan could not be started or stopped.
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    /// The physical link could not be established.
    #[error("Connection to {device_id} failed: {reason}")]
    ConnectFailed {
        /// The device that failed to connect.
        device_id: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The vitals service or one of its characteristics was not found,
    /// or subscribing to it failed.
    #[error("Service discovery on {device_id} failed: {reason}")]
    DiscoveryFailed {
        /// The device being discovered.
        device_id: String,
        /// Human-readable cause.
        reason: String,
    },

    /// A characteristic payload could not be decoded.
    ///
    /// The client never returns this: the notification path logs and drops
    /// malformed payloads. It lets callers that decode raw payloads with
    /// [`vitals_types::decode_notification`] use `?` into this error type.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The peripheral closed the link.
    #[error("Disconnected by peer")]
    DisconnectedByPeer,

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled by an explicit disconnect or shutdown.
    #[error("Operation cancelled")]
    Cancelled,

    /// The operation is not allowed in the current connection state.
    #[error("Cannot {operation} while {status}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the client was in.
        status: ConnectionStatus,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a connection failure for a device.
    pub fn connect_failed(device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            device_id: device_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a discovery failure for a device.
    pub fn discovery_failed(device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DiscoveryFailed {
            device_id: device_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Map a platform error raised while starting the operation into the
    /// precondition errors, keeping anything else as is.
    pub(crate) fn classify_platform(self) -> Self {
        match self {
            Error::Bluetooth(btleplug::Error::PermissionDenied) => Error::PermissionDenied,
            other => other,
        }
    }
}

/// Result type alias using vitals-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
