//! Error taxonomy for the session client.
//!
//! - [`TransportError`]: socket-level failures raised by a connector
//! - [`SessionError`]: everything the protocol engine and facade surface
//!
//! Transport and protocol failures are mostly absorbed by the engine and
//! turned into [`ConnectionState`](crate::ConnectionState) transitions. The
//! classification helpers decide which path a failure takes: fatal errors
//! land in `Failed` without a retry, recoverable ones enter the reconnect
//! policy.

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// TransportError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure reported by a transport connector.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint URL could not be turned into a connect request.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// The offending endpoint.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The server refused the upgrade because of the credential (401/403).
    #[error("server rejected credentials (HTTP {status})")]
    Unauthorized {
        /// HTTP status returned on the upgrade.
        status: u16,
    },

    /// Socket open or protocol handshake failed.
    #[error("handshake with {url} failed: {reason}")]
    Handshake {
        /// URL of the attempted transport.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// The handle is stale (closed or never opened).
    #[error("transport handle is not connected")]
    NotConnected,

    /// An established link failed mid-stream.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The peer closed the link.
    #[error("transport closed: {reason}")]
    Closed {
        /// Close reason, if any.
        reason: String,
    },

    /// A deadline expired.
    #[error("timed out after {timeout_ms}ms: {context}")]
    Timeout {
        /// How long we waited.
        timeout_ms: u64,
        /// What we were waiting for.
        context: String,
    },
}

impl TransportError {
    /// Whether the failure is a credential rejection.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionError
// ─────────────────────────────────────────────────────────────────────────────

/// Session-level failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// No bearer token was supplied; nothing was attempted.
    #[error("no authentication token available")]
    MissingCredential,

    /// The server rejected the credential at CONNECT time.
    #[error("authentication rejected: {reason}")]
    AuthenticationRejected {
        /// Server-provided reason.
        reason: String,
    },

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The peer went silent for too many heart-beat intervals.
    #[error("no heart-beat from server for {missed} consecutive intervals")]
    HeartbeatTimeout {
        /// Consecutive silent intervals observed.
        missed: u32,
    },

    /// Operation requires a live connection.
    #[error("session is not connected")]
    NotConnected,

    /// A frame or payload could not be decoded.
    #[error("malformed frame: {reason}")]
    MalformedFrame {
        /// What was wrong with it.
        reason: String,
    },

    /// The pending operation was cancelled by `disconnect()` or engine shutdown.
    #[error("operation cancelled by disconnect")]
    Cancelled,
}

impl SessionError {
    /// Fatal errors never trigger a reconnect.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::MissingCredential | Self::AuthenticationRejected { .. } => true,
            Self::Transport(e) => e.is_auth_rejection(),
            _ => false,
        }
    }

    /// Recoverable errors feed the reconnect policy.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => !e.is_auth_rejection(),
            Self::HeartbeatTimeout { .. } => true,
            _ => false,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::AuthenticationRejected { .. } => "AUTHENTICATION_REJECTED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::HeartbeatTimeout { .. } => "HEARTBEAT_TIMEOUT",
            Self::NotConnected => "NOT_CONNECTED",
            Self::MalformedFrame { .. } => "MALFORMED_FRAME",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Normalize a transport credential rejection into `AuthenticationRejected`.
    #[must_use]
    pub fn from_transport(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized { status } => Self::AuthenticationRejected {
                reason: format!("HTTP {status} on upgrade"),
            },
            other => Self::Transport(other),
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn fatal_classification() {
        assert!(SessionError::MissingCredential.is_fatal());
        assert!(
            SessionError::AuthenticationRejected {
                reason: "bad token".into()
            }
            .is_fatal()
        );
        assert!(!SessionError::NotConnected.is_fatal());
        assert!(!SessionError::HeartbeatTimeout { missed: 2 }.is_fatal());
    }

    #[test]
    fn recoverable_classification() {
        assert!(SessionError::HeartbeatTimeout { missed: 2 }.is_recoverable());
        assert!(SessionError::Transport(TransportError::Io("reset".into())).is_recoverable());
        assert!(
            !SessionError::Transport(TransportError::Unauthorized { status: 401 })
                .is_recoverable()
        );
        assert!(
            !SessionError::MalformedFrame {
                reason: "x".into()
            }
            .is_recoverable()
        );
        assert!(!SessionError::NotConnected.is_recoverable());
    }

    #[test]
    fn unauthorized_transport_becomes_auth_rejected() {
        let err = SessionError::from_transport(TransportError::Unauthorized { status: 403 });
        assert_matches!(err, SessionError::AuthenticationRejected { reason } if reason.contains("403"));
    }

    #[test]
    fn other_transport_errors_stay_transport() {
        let err = SessionError::from_transport(TransportError::Io("broken pipe".into()));
        assert_matches!(err, SessionError::Transport(TransportError::Io(_)));
    }

    #[test]
    fn transport_display_is_transparent() {
        let err: SessionError = TransportError::Closed {
            reason: "going away".into(),
        }
        .into();
        assert_eq!(err.to_string(), "transport closed: going away");
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(SessionError::NotConnected.code(), "NOT_CONNECTED");
        assert_eq!(SessionError::Cancelled.code(), "CANCELLED");
        assert_eq!(
            SessionError::HeartbeatTimeout { missed: 2 }.code(),
            "HEARTBEAT_TIMEOUT"
        );
    }

    #[test]
    fn timeout_display() {
        let err = TransportError::Timeout {
            timeout_ms: 10_000,
            context: "CONNECTED frame".into(),
        };
        assert!(err.to_string().contains("10000ms"));
        assert!(err.to_string().contains("CONNECTED frame"));
    }
}
