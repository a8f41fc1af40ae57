//! Chat data model and its JSON wire format.
//!
//! - [`OutboundEnvelope`]: one send attempt, serialized as the SEND body
//! - [`InboundFrame`]: a routed MESSAGE frame before decoding
//! - [`ChatEvent`]: the decoded unit delivered to the UI

use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SessionError;
use crate::ids::{ClientNonce, RoomId, UserId};
use crate::topic::{TopicKind, TopicPath, TopicScheme};

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// A single outbound chat message.
///
/// Built by the facade on send, consumed by the protocol engine, and not
/// retained after it is written to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundEnvelope {
    /// Target room.
    pub room_id: RoomId,
    /// Local identity.
    pub sender_id: UserId,
    /// Message text.
    pub body: String,
    /// Unique per send attempt.
    pub client_nonce: ClientNonce,
}

/// SEND body. `chatRoomId` and `message` are the keys the server reads.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendPayload<'a> {
    chat_room_id: &'a RoomId,
    message: &'a str,
    sender_id: &'a UserId,
    client_nonce: &'a ClientNonce,
}

impl OutboundEnvelope {
    /// Create an envelope with a fresh nonce.
    #[must_use]
    pub fn new(room_id: RoomId, sender_id: UserId, body: impl Into<String>) -> Self {
        Self {
            room_id,
            sender_id,
            body: body.into(),
            client_nonce: ClientNonce::new(),
        }
    }

    /// Serialize the JSON body of the SEND frame.
    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(&SendPayload {
            chat_room_id: &self.room_id,
            message: &self.body,
            sender_id: &self.sender_id,
            client_nonce: &self.client_nonce,
        })
        .map_err(|e| SessionError::MalformedFrame {
            reason: format!("encode send payload: {e}"),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// A MESSAGE frame routed to a subscription, before decoding.
#[derive(Clone, Debug)]
pub struct InboundFrame {
    /// Destination the frame was published on.
    pub topic: TopicPath,
    /// Raw frame body.
    pub payload: Bytes,
    /// Local receive time.
    pub received_at: Instant,
}

impl InboundFrame {
    /// Stamp a frame with the current time.
    #[must_use]
    pub fn new(topic: TopicPath, payload: Bytes) -> Self {
        Self {
            topic,
            payload,
            received_at: Instant::now(),
        }
    }
}

/// Kind of chat event (the server's `type` field).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatEventKind {
    /// Ordinary message.
    #[default]
    Chat,
    /// A participant joined the room.
    Join,
    /// A participant left the room.
    Leave,
}

/// A decoded chat event.
///
/// The transport gives these no persistent identity; display ordering is
/// assigned later by the reconciler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEvent {
    /// Room the event belongs to.
    pub room_id: RoomId,
    /// Author.
    pub sender_id: UserId,
    /// Message text.
    pub body: String,
    /// Server timestamp, `None` for optimistic echoes or unparseable values.
    pub server_timestamp: Option<DateTime<Utc>>,
    /// Event kind.
    pub kind: ChatEventKind,
    /// Nonce echoed back by the server, when it supports it.
    pub client_nonce: Option<ClientNonce>,
}

impl ChatEvent {
    /// The optimistic local copy of an outbound message.
    #[must_use]
    pub fn from_envelope(envelope: &OutboundEnvelope) -> Self {
        Self {
            room_id: envelope.room_id.clone(),
            sender_id: envelope.sender_id.clone(),
            body: envelope.body.clone(),
            server_timestamp: None,
            kind: ChatEventKind::Chat,
            client_nonce: Some(envelope.client_nonce.clone()),
        }
    }

    /// Decode a routed frame.
    ///
    /// The room comes from the payload's `chatRoomId`, falling back to the
    /// room encoded in the topic path.
    pub fn decode(frame: &InboundFrame, scheme: &TopicScheme) -> Result<Self, SessionError> {
        let payload: MessagePayload =
            serde_json::from_slice(&frame.payload).map_err(|e| SessionError::MalformedFrame {
                reason: format!("invalid message JSON on {}: {e}", frame.topic),
            })?;

        let sender = payload.sender.ok_or_else(|| SessionError::MalformedFrame {
            reason: format!("message on {} has no sender", frame.topic),
        })?;
        let body = payload.content.ok_or_else(|| SessionError::MalformedFrame {
            reason: format!("message on {} has no content", frame.topic),
        })?;

        let room_id = match payload.chat_room_id.as_ref().and_then(value_to_id) {
            Some(room) => RoomId::from(room),
            None => match scheme.classify(&frame.topic) {
                TopicKind::Room(room) => room,
                TopicKind::Personal | TopicKind::Other => {
                    return Err(SessionError::MalformedFrame {
                        reason: format!("message on {} has no chatRoomId", frame.topic),
                    });
                }
            },
        };

        Ok(Self {
            room_id,
            sender_id: UserId::from(sender),
            body,
            server_timestamp: payload.timestamp.as_deref().and_then(parse_timestamp),
            kind: payload.kind,
            client_nonce: payload.client_nonce.map(ClientNonce::from),
        })
    }
}

/// MESSAGE body as published by the server.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    #[serde(rename = "type", default)]
    kind: ChatEventKind,
    #[serde(alias = "senderId")]
    sender: Option<String>,
    #[serde(alias = "message")]
    content: Option<String>,
    timestamp: Option<String>,
    chat_room_id: Option<Value>,
    client_nonce: Option<String>,
}

/// Room IDs arrive as strings or numbers depending on the server's entity type.
fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an RFC 3339 timestamp, or a zone-less ISO local datetime as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
