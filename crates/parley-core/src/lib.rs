//! # parley-core
//!
//! Foundation types for the Parley realtime chat session client.
//!
//! This crate provides the shared vocabulary that the transport, session and
//! CLI crates depend on:
//!
//! - **IDs**: `RoomId`, `UserId`, `SubscriptionId`, `ClientNonce`, `AuthToken`
//! - **Topics**: `TopicPath` and the `TopicScheme` naming convention
//! - **Data model**: `ConnectionState`, `OutboundEnvelope`, `InboundFrame`, `ChatEvent`
//! - **Errors**: `SessionError` / `TransportError` taxonomy via `thiserror`
//! - **Backoff**: `ReconnectPolicy` and the capped exponential delay math
//! - **Logging**: `tracing` subscriber bootstrap and in-memory log capture

#![deny(unsafe_code)]

pub mod chat;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod retry;
pub mod state;
pub mod topic;

pub use chat::{ChatEvent, ChatEventKind, InboundFrame, OutboundEnvelope};
pub use errors::{SessionError, TransportError};
pub use ids::{AuthToken, ClientNonce, RoomId, SubscriptionId, UserId};
pub use retry::ReconnectPolicy;
pub use state::ConnectionState;
pub use topic::{TopicKind, TopicPath, TopicScheme};
