//! Topic naming convention.
//!
//! Personal inbox and per-room broadcast topics live in distinct namespaces.
//! The defaults match the chat server's Spring STOMP broker bit-for-bit:
//!
//! | Topic      | Path                     |
//! |------------|--------------------------|
//! | personal   | `/user/queue/messages`   |
//! | room       | `/topic/room/{roomId}`   |
//! | send       | `/app/send`              |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::RoomId;

/// Default personal queue destination.
pub const DEFAULT_PERSONAL_TOPIC: &str = "/user/queue/messages";
/// Default room topic prefix (the room ID is appended).
pub const DEFAULT_ROOM_PREFIX: &str = "/topic/room/";
/// Default application destination for outbound chat messages.
pub const DEFAULT_SEND_DESTINATION: &str = "/app/send";

/// A pub/sub destination path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicPath(String);

impl TopicPath {
    /// Wrap a raw destination path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopicPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TopicPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which namespace a topic belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicKind {
    /// The session's personal inbox.
    Personal,
    /// A room broadcast topic.
    Room(RoomId),
    /// Anything outside the two namespaces.
    Other,
}

/// Topic naming convention shared by the facade and the decoder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopicScheme {
    /// Personal queue destination.
    pub personal: String,
    /// Prefix of every room topic.
    pub room_prefix: String,
    /// Destination for outbound SEND frames.
    pub send_destination: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            personal: DEFAULT_PERSONAL_TOPIC.to_string(),
            room_prefix: DEFAULT_ROOM_PREFIX.to_string(),
            send_destination: DEFAULT_SEND_DESTINATION.to_string(),
        }
    }
}

impl TopicScheme {
    /// The personal inbox topic.
    #[must_use]
    pub fn personal(&self) -> TopicPath {
        TopicPath::new(self.personal.clone())
    }

    /// The broadcast topic for `room`.
    #[must_use]
    pub fn room(&self, room: &RoomId) -> TopicPath {
        TopicPath::new(format!("{}{}", self.room_prefix, room))
    }

    /// The outbound send destination.
    #[must_use]
    pub fn send_destination(&self) -> TopicPath {
        TopicPath::new(self.send_destination.clone())
    }

    /// Classify a destination into one of the namespaces.
    #[must_use]
    pub fn classify(&self, topic: &TopicPath) -> TopicKind {
        if topic.as_str() == self.personal {
            return TopicKind::Personal;
        }
        match topic.as_str().strip_prefix(&self.room_prefix) {
            Some(room) if !room.is_empty() => TopicKind::Room(RoomId::from(room)),
            _ => TopicKind::Other,
        }
    }
}
