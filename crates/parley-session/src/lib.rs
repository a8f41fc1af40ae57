//! # parley-session
//!
//! STOMP session management for the Parley chat client.
//!
//! - [`frame`]: STOMP 1.2 frame codec
//! - [`heartbeat`]: heart-beat negotiation and liveness monitor
//! - [`registry`]: topic to handler routing, replayed on every CONNECTED
//! - [`engine`]: the protocol engine actor and its connection state machine
//! - [`reconciler`]: optimistic local echo versus server delivery
//! - [`facade`]: `ChatClient` and `RoomSession`, the UI-facing API

#![deny(unsafe_code)]

pub mod engine;
pub mod facade;
pub mod frame;
pub mod heartbeat;
pub mod reconciler;
pub mod registry;

pub use engine::{EngineConfig, SessionEngine, StateTransition};
pub use facade::{ChatClient, RoomSession, SendOutcome};
pub use frame::{Command, Frame, FrameError};
pub use heartbeat::{HeartbeatCheck, HeartbeatMonitor, HeartbeatPlan};
pub use reconciler::{MessageReconciler, Origin, TimelineEntry};
pub use registry::{Delivery, FrameHandler, SubscriptionRegistry};
