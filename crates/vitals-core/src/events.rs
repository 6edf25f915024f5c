//! Status-changed events delivered to `on_status_change` subscribers.

use serde::{Deserialize, Serialize};

use vitals_types::{AdapterState, ConnectionStatus, StatusRecord};

/// Events published on the status-changed stream.
///
/// All events are serializable for logging and IPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum StatusEvent {
    /// The connection state machine took a transition.
    Connection {
        status: ConnectionStatus,
        /// Set when entering `Error`.
        cause: Option<String>,
    },
    /// A status record arrived and was merged into the accumulator.
    Sensor {
        record: StatusRecord,
        signal_quality: u8,
    },
    /// The adapter changed power state without affecting the connection.
    Adapter { state: AdapterState },
}

impl StatusEvent {
    /// The connection status carried by a `Connection` event.
    pub fn connection_status(&self) -> Option<ConnectionStatus> {
        match self {
            StatusEvent::Connection { status, .. } => Some(*status),
            _ => None,
        }
    }
}
