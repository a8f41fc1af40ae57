//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a partial JSON file only overrides the keys it names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use parley_core::retry::ReconnectPolicy;
pub use parley_core::topic::TopicScheme;

/// Default chat endpoint.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws/chat";

/// Root settings for the session client.
///
/// ```json
/// {
///   "connection": { "endpoint": "wss://chat.example.com/ws/chat" },
///   "heartbeat": { "outgoingMs": 10000 },
///   "reconnect": { "maxAttempts": 3 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Settings schema version.
    pub version: String,
    /// Endpoint and transport negotiation.
    pub connection: ConnectionSettings,
    /// STOMP heart-beat contract.
    pub heartbeat: HeartbeatSettings,
    /// Reconnect policy after recoverable failures.
    pub reconnect: ReconnectPolicy,
    /// Topic naming convention.
    pub topics: TopicScheme,
    /// Duplicate suppression for optimistic echoes.
    pub reconcile: ReconcileSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for ParleySettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            connection: ConnectionSettings::default(),
            heartbeat: HeartbeatSettings::default(),
            reconnect: ReconnectPolicy::default(),
            topics: TopicScheme::default(),
            reconcile: ReconcileSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────────────────────────

/// Underlying transport flavour tried during negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Raw WebSocket at the endpoint URL.
    Websocket,
    /// SockJS websocket transport under the endpoint.
    Sockjs,
}

/// Endpoint, negotiation order, timeouts and buffer sizes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Server endpoint (`ws`, `wss`, `http` or `https`).
    pub endpoint: String,
    /// Transports in the order they are attempted.
    pub transports: Vec<TransportKind>,
    /// Deadline for socket open plus CONNECTED acknowledgment.
    pub connect_timeout_ms: u64,
    /// Capacity of the engine command queue.
    pub command_buffer: usize,
    /// Capacity of per-subscription frame channels.
    pub subscription_buffer: usize,
    /// Capacity of per-room timeline channels.
    pub room_buffer: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            transports: vec![TransportKind::Websocket, TransportKind::Sockjs],
            connect_timeout_ms: 10_000,
            command_buffer: 64,
            subscription_buffer: 256,
            room_buffer: 256,
        }
    }
}

impl ConnectionSettings {
    /// Connect deadline as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Heartbeat
// ─────────────────────────────────────────────────────────────────────────────

/// Client side of the STOMP `heart-beat` header. Zero disables a direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// How often we can send heart-beats.
    pub outgoing_ms: u64,
    /// How often we want to receive them.
    pub incoming_ms: u64,
    /// Consecutive silent intervals tolerated before declaring the link dead.
    pub max_missed: u32,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            outgoing_ms: 4000,
            incoming_ms: 4000,
            max_missed: 2,
        }
    }
}

impl HeartbeatSettings {
    /// Heart-beats disabled in both directions.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            outgoing_ms: 0,
            incoming_ms: 0,
            ..Self::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconcile
// ─────────────────────────────────────────────────────────────────────────────

/// How server echoes of local sends are recognised.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Suppress every inbound event authored by the local identity.
    #[default]
    SenderIdentity,
    /// Suppress only inbound events echoing an outstanding local nonce.
    ClientNonce,
}

/// Reconciler configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileSettings {
    /// Active policy.
    pub policy: ReconcilePolicy,
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
