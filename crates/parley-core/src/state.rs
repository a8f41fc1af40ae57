//! Session connection state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the realtime session.
///
/// Only the protocol engine mutates this; everything else observes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport and no pending attempt.
    #[default]
    Disconnected,
    /// Transport opening or CONNECT awaiting acknowledgment.
    Connecting,
    /// CONNECTED received; subscriptions are live.
    Connected,
    /// Connection lost; waiting for the next attempt.
    Reconnecting,
    /// Terminal: credentials rejected or reconnect attempts exhausted.
    Failed,
}

impl ConnectionState {
    /// Whether outbound sends are allowed.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Whether an attempt is in flight or scheduled.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Whether the engine is idle (no transport, nothing scheduled).
    #[must_use]
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    /// UI-friendly online indicator.
    #[must_use]
    pub fn is_online(self) -> bool {
        self.is_connected()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
