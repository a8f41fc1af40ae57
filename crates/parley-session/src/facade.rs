//! Session facade: the UI-facing surface.
//!
//! [`ChatClient`] owns one [`SessionEngine`] and hands out a [`RoomSession`]
//! per open room. Each room gets its own pump task that decodes routed
//! frames, runs them through the room's [`MessageReconciler`] and pushes the
//! resulting timeline entries to the session's event channel.

use std::sync::Arc;

use parking_lot::Mutex;
use parley_core::{
    AuthToken, ChatEvent, ClientNonce, ConnectionState, InboundFrame, OutboundEnvelope, RoomId,
    SessionError, SubscriptionId, TopicScheme, UserId,
};
use parley_settings::{ParleySettings, ReconcilePolicy};
use parley_transport::Connector;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{ReceiverStream, WatchStream};
use tracing::{debug, info, warn};

use crate::engine::{EngineConfig, SessionEngine, StateTransition};
use crate::reconciler::{MessageReconciler, TimelineEntry};

type Result<T> = std::result::Result<T, SessionError>;

/// Capacity of the personal inbox broadcast.
const INBOX_BUFFER: usize = 128;

/// Outcome of [`RoomSession::send`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the transport and echoed locally.
    Sent {
        /// Nonce carried by the outbound message.
        nonce: ClientNonce,
    },
    /// The session is offline; nothing was sent or echoed.
    NotConnected,
}

// ─────────────────────────────────────────────────────────────────────────────
// ChatClient
// ─────────────────────────────────────────────────────────────────────────────

/// One chat identity bound to one endpoint.
pub struct ChatClient {
    engine: SessionEngine,
    identity: UserId,
    token: Option<AuthToken>,
    endpoint: String,
    topics: TopicScheme,
    policy: ReconcilePolicy,
    subscription_buffer: usize,
    room_buffer: usize,
    inbox: broadcast::Sender<ChatEvent>,
    personal: tokio::sync::Mutex<()>,
}

impl ChatClient {
    /// Create a client. Nothing connects until a room is opened or
    /// [`connect`](Self::connect) is called.
    pub fn new(
        settings: &ParleySettings,
        connector: Arc<dyn Connector>,
        identity: UserId,
        token: Option<AuthToken>,
    ) -> Self {
        let engine = SessionEngine::spawn(EngineConfig::from_settings(settings), connector);
        let (inbox, _) = broadcast::channel(INBOX_BUFFER);
        Self {
            engine,
            identity,
            token,
            endpoint: settings.connection.endpoint.clone(),
            topics: settings.topics.clone(),
            policy: settings.reconcile.policy,
            subscription_buffer: settings.connection.subscription_buffer.max(1),
            room_buffer: settings.connection.room_buffer.max(1),
            inbox,
            personal: tokio::sync::Mutex::new(()),
        }
    }

    /// Local identity.
    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    /// Underlying engine.
    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    /// Ensure a live connection holding the personal inbox subscription.
    pub async fn connect(&self) -> Result<()> {
        self.engine.connect(&self.endpoint, self.token.as_ref()).await?;
        self.ensure_personal().await
    }

    /// Tear everything down. Open rooms stop receiving events.
    pub async fn disconnect(&self) {
        self.engine.disconnect().await;
    }

    /// Connect, subscribe the personal inbox and `room`, and return the room
    /// handle.
    pub async fn open_room_session(&self, room: RoomId) -> Result<RoomSession> {
        self.connect().await?;

        let (frame_tx, frame_rx) = mpsc::channel(self.subscription_buffer);
        let subscription = self.engine.subscribe(self.topics.room(&room), frame_tx).await?;

        let reconciler = Arc::new(Mutex::new(MessageReconciler::new(
            self.identity.clone(),
            self.policy,
        )));
        let (events_tx, events_rx) = mpsc::channel(self.room_buffer);
        let local_tx = events_tx.downgrade();
        drop(tokio::spawn(room_pump(
            room.clone(),
            frame_rx,
            Arc::clone(&reconciler),
            events_tx,
            self.topics.clone(),
        )));

        info!(%room, %subscription, "room opened");
        Ok(RoomSession {
            room,
            subscription,
            engine: self.engine.clone(),
            identity: self.identity.clone(),
            reconciler,
            events_tx: local_tx,
            events_rx,
        })
    }

    /// Close `session`. Only the room topic is unsubscribed.
    pub async fn close(&self, session: RoomSession) {
        info!(room = %session.room, "room closed");
        self.engine.unsubscribe(session.subscription).await;
    }

    /// Unsubscribe `room` without holding its session.
    pub async fn close_room(&self, room: &RoomId) {
        info!(%room, "room closed");
        self.engine.unsubscribe_topic(self.topics.room(room)).await;
    }

    /// Decoded personal-inbox events.
    pub fn inbox(&self) -> broadcast::Receiver<ChatEvent> {
        self.inbox.subscribe()
    }

    /// Current state followed by every change.
    pub fn observe_connection_state(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.engine.watch_state())
    }

    /// Every transition from now on, with its cause.
    pub fn state_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.engine.transitions()
    }

    /// Current state.
    pub fn connection_state(&self) -> ConnectionState {
        self.engine.state()
    }

    /// Subscribe the personal topic unless the engine already has it.
    async fn ensure_personal(&self) -> Result<()> {
        let _guard = self.personal.lock().await;
        let topic = self.topics.personal();
        if self.engine.active_topics().await.contains(&topic) {
            return Ok(());
        }
        let (frame_tx, frame_rx) = mpsc::channel(self.subscription_buffer);
        let id = self.engine.subscribe(topic, frame_tx).await?;
        debug!(%id, "personal inbox subscribed");
        drop(tokio::spawn(personal_pump(
            frame_rx,
            self.inbox.clone(),
            self.topics.clone(),
        )));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RoomSession
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to one open room.
pub struct RoomSession {
    room: RoomId,
    subscription: SubscriptionId,
    engine: SessionEngine,
    identity: UserId,
    reconciler: Arc<Mutex<MessageReconciler>>,
    /// Weak so the channel closes when the pump exits.
    events_tx: mpsc::WeakSender<TimelineEntry>,
    events_rx: mpsc::Receiver<TimelineEntry>,
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("room", &self.room)
            .field("subscription", &self.subscription)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl RoomSession {
    /// The room.
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Subscription backing the room feed.
    pub fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription
    }

    /// Next timeline entry. `None` once the room is closed or the session
    /// torn down.
    pub async fn recv(&mut self) -> Option<TimelineEntry> {
        self.events_rx.recv().await
    }

    /// Timeline entries as a stream.
    pub fn into_stream(self) -> ReceiverStream<TimelineEntry> {
        ReceiverStream::new(self.events_rx)
    }

    /// Send `body` to the room.
    ///
    /// Never fails: an offline session yields [`SendOutcome::NotConnected`]
    /// and nothing is echoed.
    pub async fn send(&self, body: impl Into<String>) -> SendOutcome {
        let envelope = OutboundEnvelope::new(self.room.clone(), self.identity.clone(), body);
        let nonce = envelope.client_nonce.clone();
        self.reconciler.lock().expect_echo(&nonce);

        match self.engine.send(envelope.clone()).await {
            Ok(()) => {
                let mut reconciler = self.reconciler.lock();
                let entry = reconciler.local(&envelope);
                if let Some(events) = self.events_tx.upgrade() {
                    if events.try_send(entry).is_err() {
                        warn!(room = %self.room, "room event queue full, dropping local echo");
                    }
                }
                SendOutcome::Sent { nonce }
            }
            Err(e) => {
                self.reconciler.lock().cancel_echo(&nonce);
                debug!(room = %self.room, error = %e, "send rejected");
                SendOutcome::NotConnected
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pumps
// ─────────────────────────────────────────────────────────────────────────────

async fn room_pump(
    room: RoomId,
    mut frames: mpsc::Receiver<InboundFrame>,
    reconciler: Arc<Mutex<MessageReconciler>>,
    events: mpsc::Sender<TimelineEntry>,
    topics: TopicScheme,
) {
    while let Some(frame) = frames.recv().await {
        if events.is_closed() {
            break;
        }
        let event = match ChatEvent::decode(&frame, &topics) {
            Ok(event) => event,
            Err(e) => {
                warn!(%room, topic = %frame.topic, error = %e, "dropping malformed message");
                continue;
            }
        };
        let mut reconciler = reconciler.lock();
        if let Some(entry) = reconciler.remote(event) {
            if events.try_send(entry).is_err() {
                warn!(%room, "room event queue full, dropping message");
            }
        }
    }
    debug!(%room, "room pump finished");
}

async fn personal_pump(
    mut frames: mpsc::Receiver<InboundFrame>,
    inbox: broadcast::Sender<ChatEvent>,
    topics: TopicScheme,
) {
    while let Some(frame) = frames.recv().await {
        match ChatEvent::decode(&frame, &topics) {
            Ok(event) => {
                let _ = inbox.send(event);
            }
            Err(e) => warn!(topic = %frame.topic, error = %e, "dropping malformed message"),
        }
    }
    debug!("personal pump finished");
}
