//! In-process connector for tests and embedding.
//!
//! [`MemoryConnector::pair`] returns the client half plus a [`MemoryServer`]
//! that accepts one [`MemoryPeer`] per successful `open`. The peer sees every
//! frame the client sends and can push frames, fail the link, or close it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use parley_core::{AuthToken, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connector::{ConnectionHandle, Connector, Link, LinkTable, TransportEvent};

const DEFAULT_BUFFER: usize = 256;

struct Shared {
    links: LinkTable,
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    refusals: Mutex<VecDeque<TransportError>>,
    refuse_always: Mutex<Option<TransportError>>,
    open_attempts: AtomicUsize,
    send_attempts: AtomicUsize,
}

/// Client half of an in-memory link pair.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// Create a connector and the server that accepts its links.
    #[must_use]
    pub fn pair() -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            links: LinkTable::new(),
            accept_tx,
            refusals: Mutex::new(VecDeque::new()),
            refuse_always: Mutex::new(None),
            open_attempts: AtomicUsize::new(0),
            send_attempts: AtomicUsize::new(0),
        });
        (Self { shared }, MemoryServer { accept_rx })
    }

    /// Fail the next `open` with `err`. Queued refusals apply in order.
    pub fn refuse_next(&self, err: TransportError) {
        self.shared.refusals.lock().push_back(err);
    }

    /// Fail every `open` with `err` until reset with `None`.
    pub fn refuse_always(&self, err: Option<TransportError>) {
        *self.shared.refuse_always.lock() = err;
    }

    /// Number of `open` calls so far, refused ones included.
    pub fn open_attempts(&self) -> usize {
        self.shared.open_attempts.load(Ordering::SeqCst)
    }

    /// Number of `send` calls so far, failed ones included.
    pub fn send_attempts(&self) -> usize {
        self.shared.send_attempts.load(Ordering::SeqCst)
    }

    /// Number of links currently open.
    pub fn live_links(&self) -> usize {
        self.shared.links.len()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, endpoint: &str, token: &AuthToken) -> Result<Link, TransportError> {
        let _ = self.shared.open_attempts.fetch_add(1, Ordering::SeqCst);

        let refusal = self
            .shared
            .refusals
            .lock()
            .pop_front()
            .or_else(|| self.shared.refuse_always.lock().clone());
        if let Some(err) = refusal {
            debug!(endpoint, error = %err, "memory open refused");
            return Err(err);
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(DEFAULT_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(DEFAULT_BUFFER);
        let cancel = CancellationToken::new();
        let handle = self.shared.links.insert(outbound_tx, cancel.clone());
        let _ = events_tx.send(TransportEvent::Open).await;

        let peer = MemoryPeer {
            handle,
            endpoint: endpoint.to_string(),
            token: token.clone(),
            inbound: outbound_rx,
            events: events_tx,
            cancel,
            shared: Arc::clone(&self.shared),
        };
        if self.shared.accept_tx.send(peer).is_err() {
            return Err(TransportError::Handshake {
                url: endpoint.to_string(),
                reason: "memory server is gone".to_string(),
            });
        }

        Ok(Link {
            handle,
            events: events_rx,
        })
    }

    async fn send(&self, handle: ConnectionHandle, frame: Bytes) -> Result<(), TransportError> {
        let _ = self.shared.send_attempts.fetch_add(1, Ordering::SeqCst);
        self.shared.links.send(handle, frame).await
    }

    async fn close(&self, handle: ConnectionHandle) {
        let _ = self.shared.links.close(handle);
    }
}

/// Accepting half of an in-memory link pair.
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Wait for the next opened link. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }
}

/// Server end of one in-memory link.
///
/// Dropping the peer makes the client's handle stale and ends its event
/// stream without a close event.
pub struct MemoryPeer {
    handle: ConnectionHandle,
    endpoint: String,
    token: AuthToken,
    inbound: mpsc::Receiver<Bytes>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
    shared: Arc<Shared>,
}

impl MemoryPeer {
    /// Handle the client holds for this link.
    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    /// Endpoint passed to `open`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Credential presented on `open`.
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    /// Whether the client closed the link.
    pub fn closed_by_client(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Next frame written by the client. `None` once the client closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbound.recv().await
    }

    /// Deliver a frame to the client. Returns `false` if nobody is listening.
    pub async fn push(&self, frame: impl Into<Bytes>) -> bool {
        self.events
            .send(TransportEvent::Frame(frame.into()))
            .await
            .is_ok()
    }

    /// Fail the link with `err`.
    pub async fn fail(self, err: TransportError) {
        self.shared.links.release(self.handle);
        let _ = self.events.send(TransportEvent::Error(err)).await;
    }

    /// Close the link from the server side.
    pub async fn close(self, reason: &str) {
        self.shared.links.release(self.handle);
        let _ = self
            .events
            .send(TransportEvent::Closed {
                reason: reason.to_string(),
            })
            .await;
    }
}

impl Drop for MemoryPeer {
    fn drop(&mut self) {
        self.shared.links.release(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn open_emits_open_then_frames() {
        let (connector, mut server) = MemoryConnector::pair();
        let mut link = connector
            .open("memory://chat", &AuthToken::new("tok"))
            .await
            .unwrap();
        let peer = server.accept().await.unwrap();

        assert_eq!(peer.token().expose(), "tok");
        assert_eq!(peer.endpoint(), "memory://chat");
        assert_eq!(peer.handle(), link.handle);

        assert!(peer.push("MESSAGE\n\n\0").await);
        assert_eq!(link.events.recv().await, Some(TransportEvent::Open));
        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Frame(Bytes::from("MESSAGE\n\n\0")))
        );
    }

    #[tokio::test]
    async fn client_frames_reach_peer() {
        let (connector, mut server) = MemoryConnector::pair();
        let link = connector.open("m", &AuthToken::new("t")).await.unwrap();
        let mut peer = server.accept().await.unwrap();

        connector
            .send(link.handle, Bytes::from_static(b"CONNECT"))
            .await
            .unwrap();
        assert_eq!(peer.recv().await.unwrap(), Bytes::from_static(b"CONNECT"));
        assert_eq!(connector.send_attempts(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_visible_to_peer() {
        let (connector, mut server) = MemoryConnector::pair();
        let link = connector.open("m", &AuthToken::new("t")).await.unwrap();
        let mut peer = server.accept().await.unwrap();

        connector.close(link.handle).await;
        connector.close(link.handle).await;

        assert!(peer.closed_by_client());
        assert_eq!(peer.recv().await, None);
        assert_matches!(
            connector.send(link.handle, Bytes::new()).await,
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn peer_failure_is_single_error_event() {
        let (connector, mut server) = MemoryConnector::pair();
        let mut link = connector.open("m", &AuthToken::new("t")).await.unwrap();
        let peer = server.accept().await.unwrap();

        peer.fail(TransportError::Io("reset".into())).await;

        assert_eq!(link.events.recv().await, Some(TransportEvent::Open));
        assert_eq!(
            link.events.recv().await,
            Some(TransportEvent::Error(TransportError::Io("reset".into())))
        );
        assert_eq!(link.events.recv().await, None);
        assert_eq!(connector.live_links(), 0);
    }

    #[tokio::test]
    async fn refusals_apply_in_order() {
        let (connector, _server) = MemoryConnector::pair();
        connector.refuse_next(TransportError::Unauthorized { status: 401 });
        connector.refuse_next(TransportError::Io("down".into()));

        assert_matches!(
            connector.open("m", &AuthToken::new("t")).await,
            Err(TransportError::Unauthorized { status: 401 })
        );
        assert_matches!(
            connector.open("m", &AuthToken::new("t")).await,
            Err(TransportError::Io(_))
        );
        assert!(connector.open("m", &AuthToken::new("t")).await.is_ok());
        assert_eq!(connector.open_attempts(), 3);
    }

    #[tokio::test]
    async fn refuse_always_until_reset() {
        let (connector, _server) = MemoryConnector::pair();
        connector.refuse_always(Some(TransportError::Io("down".into())));
        assert!(connector.open("m", &AuthToken::new("t")).await.is_err());
        assert!(connector.open("m", &AuthToken::new("t")).await.is_err());
        connector.refuse_always(None);
        assert!(connector.open("m", &AuthToken::new("t")).await.is_ok());
    }

    #[tokio::test]
    async fn open_without_server_fails() {
        let (connector, server) = MemoryConnector::pair();
        drop(server);
        assert_matches!(
            connector.open("m", &AuthToken::new("t")).await,
            Err(TransportError::Handshake { .. })
        );
        assert_eq!(connector.live_links(), 0);
    }

    #[tokio::test]
    async fn dropped_peer_ends_event_stream() {
        let (connector, mut server) = MemoryConnector::pair();
        let mut link = connector.open("m", &AuthToken::new("t")).await.unwrap();
        drop(server.accept().await.unwrap());

        assert_eq!(link.events.recv().await, Some(TransportEvent::Open));
        assert_eq!(link.events.recv().await, None);
        assert_matches!(
            connector.send(link.handle, Bytes::new()).await,
            Err(TransportError::NotConnected)
        );
    }
}
