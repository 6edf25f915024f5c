//! Connection lifecycle state machine.
//!
//! The machine is pure and synchronous: it never performs I/O, it only decides
//! whether an event moves the connection from one [`ConnectionStatus`] to
//! another. The client feeds it events and acts on the transitions it returns.
//!
//! ```text
//!                 StartScan              Connect
//!  Disconnected ─────────────▶ Scanning ─────────▶ Connecting ──Established──▶ Connected
//!       ▲  ▲      ScanFinished    │                   │                          │
//!       │  └──────────────────────┘      ConnectFailed│DiscoveryFailed           │
//!       │                                             ▼                          │
//!       └──────────── Disconnect ──────────────────  Error ◀──────Fault──────────┘
//! ```

use vitals_types::ConnectionStatus;

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Caller requested a scan and the preconditions held.
    StartScan,
    /// The scan window elapsed or was stopped early.
    ScanFinished,
    /// Caller requested a connection and the preconditions held.
    Connect,
    /// Link is up and the vitals service was fully discovered.
    Established,
    /// The link could not be established.
    ConnectFailed(String),
    /// The service or a characteristic was missing.
    DiscoveryFailed(String),
    /// Caller requested a disconnect.
    Disconnect,
    /// The peripheral dropped the link.
    PeerDisconnected,
    /// Unrecoverable adapter-level or precondition failure.
    Fault(String),
}

/// A state change produced by [`ConnectionStateMachine::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionStatus,
    pub to: ConnectionStatus,
    /// Human-readable cause, set when entering `Error`.
    pub cause: Option<String>,
}

/// Owns the current [`ConnectionStatus`].
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    status: ConnectionStatus,
    last_error: Option<String>,
}

impl ConnectionStateMachine {
    /// Create a machine in the `Disconnected` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Cause of the most recent transition into `Error`, cleared when the
    /// machine leaves `Error`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether `event` would cause a transition from the current state.
    pub fn accepts(&self, event: &ConnectionEvent) -> bool {
        Self::next(self.status, event).is_some()
    }

    /// Apply an event.
    ///
    /// Returns the transition taken, or `None` if the event is not valid in
    /// the current state (the state is left untouched).
    pub fn apply(&mut self, event: ConnectionEvent) -> Option<Transition> {
        let to = Self::next(self.status, &event)?;
        let from = self.status;

        let cause = match event {
            ConnectionEvent::ConnectFailed(cause)
            | ConnectionEvent::DiscoveryFailed(cause)
            | ConnectionEvent::Fault(cause) => Some(cause),
            _ => None,
        };

        self.status = to;
        self.last_error = if to == ConnectionStatus::Error {
            cause.clone()
        } else {
            None
        };

        Some(Transition { from, to, cause })
    }

    fn next(from: ConnectionStatus, event: &ConnectionEvent) -> Option<ConnectionStatus> {
        use ConnectionEvent as E;
        use ConnectionStatus as S;

        match (from, event) {
            (S::Disconnected | S::Error, E::StartScan) => Some(S::Scanning),
            (S::Scanning, E::ScanFinished) => Some(S::Disconnected),
            (S::Disconnected | S::Scanning | S::Error, E::Connect) => Some(S::Connecting),
            (S::Connecting, E::Established) => Some(S::Connected),
            (S::Connecting, E::ConnectFailed(_) | E::DiscoveryFailed(_)) => Some(S::Error),
            (S::Scanning | S::Connecting | S::Connected | S::Error, E::Disconnect) => {
                Some(S::Disconnected)
            }
            (S::Connected, E::PeerDisconnected) => Some(S::Disconnected),
            (_, E::Fault(_)) => Some(S::Error),
            _ => None,
        }
    }
}
