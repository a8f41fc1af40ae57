//! # parley-transport
//!
//! Low-level links between the session engine and a chat server.
//!
//! - [`Connector`]: the `open` / `send` / `close` contract the engine drives
//! - [`WebSocketConnector`]: `tokio-tungstenite` client with SockJS fallback
//! - [`MemoryConnector`]: in-process link pair for deterministic tests
//!
//! A connector never retries. Every failure is reported once, either as an
//! `Err` from `open` or as a single [`TransportEvent::Error`] on the link's
//! event channel, and retry decisions belong to the caller.

#![deny(unsafe_code)]

pub mod connector;
pub mod memory;
pub mod sockjs;
pub mod websocket;

pub use connector::{ConnectionHandle, Connector, Link, LinkTable, TransportEvent};
pub use memory::{MemoryConnector, MemoryPeer, MemoryServer};
pub use websocket::WebSocketConnector;
