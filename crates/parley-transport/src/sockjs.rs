//! SockJS websocket-transport framing.
//!
//! The server wraps every payload in a one-letter frame type:
//!
//! | Frame            | Meaning                                  |
//! |------------------|------------------------------------------|
//! | `o`              | session open                             |
//! | `h`              | SockJS-level heartbeat                   |
//! | `a["..", ".."]`  | one or more payload strings              |
//! | `m".."`          | single payload string (legacy)           |
//! | `c[code,"why"]`  | session closed                           |
//!
//! Client writes are a JSON array holding one string.

use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::Value;

/// Length of the random session segment.
const SESSION_ID_LEN: usize = 8;

/// One decoded server frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SockJsFrame {
    /// Session opened.
    Open,
    /// Keep-alive from the SockJS layer (not a STOMP heart-beat).
    Heartbeat,
    /// Payloads, in order.
    Messages(Vec<String>),
    /// Session closed by the server.
    Close {
        /// SockJS close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Decode a server text frame. Returns `None` for anything unrecognised.
pub fn parse_frame(text: &str) -> Option<SockJsFrame> {
    let (kind, rest) = text.split_at_checked(1)?;
    match kind {
        "o" if rest.is_empty() => Some(SockJsFrame::Open),
        "h" if rest.is_empty() => Some(SockJsFrame::Heartbeat),
        "a" => serde_json::from_str::<Vec<String>>(rest)
            .ok()
            .map(SockJsFrame::Messages),
        "m" => serde_json::from_str::<String>(rest)
            .ok()
            .map(|msg| SockJsFrame::Messages(vec![msg])),
        "c" => {
            let parts: Vec<Value> = serde_json::from_str(rest).ok()?;
            let code = parts.first()?.as_u64()?;
            let reason = parts
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(SockJsFrame::Close {
                code: u16::try_from(code).ok()?,
                reason,
            })
        }
        _ => None,
    }
}

/// Encode one client payload.
pub fn encode_message(payload: &str) -> String {
    // Serializing a &[&str] cannot fail.
    serde_json::to_string(&[payload]).unwrap_or_else(|_| "[]".to_string())
}

/// Websocket URL for the SockJS transport under `base`.
///
/// `base` must already carry a `ws`/`wss` scheme.
pub fn transport_url(base: &str, server_id: u16, session_id: &str) -> String {
    format!(
        "{}/{:03}/{session_id}/websocket",
        base.trim_end_matches('/'),
        server_id % 1000
    )
}

/// Random `(server_id, session_id)` pair for a new session.
pub fn random_session() -> (u16, String) {
    let mut rng = rand::rng();
    let server_id = rng.random_range(0..1000u16);
    let session_id = (&mut rng)
        .sample_iter(Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect();
    (server_id, session_id)
}
