//! Connector contract and the shared link table.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use parley_core::{AuthToken, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Opaque identity of one opened link.
///
/// Handles are never reused within a process, so a handle kept past
/// `close` stays stale forever.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value, for log fields.
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Event raised by a link to its owner.
///
/// `Open` is always first. A link ends with exactly one of `Error` or
/// `Closed` unless the owner closed it, in which case nothing follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link is established and writable.
    Open,
    /// One inbound payload.
    Frame(Bytes),
    /// The link failed.
    Error(TransportError),
    /// The peer closed the link.
    Closed {
        /// Close reason reported by the peer.
        reason: String,
    },
}

/// An opened link: its handle plus the event stream for it.
#[derive(Debug)]
pub struct Link {
    /// Handle for `send` / `close`.
    pub handle: ConnectionHandle,
    /// Events for this link, in arrival order.
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Transport seam driven by the session engine.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a link to `endpoint`, presenting `token` as the
    /// connect-time credential.
    async fn open(&self, endpoint: &str, token: &AuthToken) -> Result<Link, TransportError>;

    /// Write one frame. Fails with [`TransportError::NotConnected`] when the
    /// handle is stale.
    async fn send(&self, handle: ConnectionHandle, frame: Bytes) -> Result<(), TransportError>;

    /// Release the link. Closing a stale handle is a no-op.
    async fn close(&self, handle: ConnectionHandle);
}

// ─────────────────────────────────────────────────────────────────────────────
// Link table
// ─────────────────────────────────────────────────────────────────────────────

struct LinkSlot {
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

/// Live links keyed by handle.
///
/// Each slot holds the writer half of the link's outbound queue and the
/// token that stops its pump task. Removing the slot is what makes a handle
/// stale.
#[derive(Default)]
pub struct LinkTable {
    slots: Mutex<HashMap<ConnectionHandle, LinkSlot>>,
}

impl LinkTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a link and allocate its handle.
    pub fn insert(&self, outbound: mpsc::Sender<Bytes>, cancel: CancellationToken) -> ConnectionHandle {
        let handle = ConnectionHandle::next();
        let _ = self.slots.lock().insert(handle, LinkSlot { outbound, cancel });
        handle
    }

    /// Queue a frame on the link's outbound channel.
    pub async fn send(&self, handle: ConnectionHandle, frame: Bytes) -> Result<(), TransportError> {
        let outbound = self
            .slots
            .lock()
            .get(&handle)
            .map(|slot| slot.outbound.clone())
            .ok_or(TransportError::NotConnected)?;
        outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::NotConnected)
    }

    /// Remove the slot and cancel its pump. Returns whether it was live.
    pub fn close(&self, handle: ConnectionHandle) -> bool {
        match self.slots.lock().remove(&handle) {
            Some(slot) => {
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the slot without cancelling (the pump is already exiting).
    pub fn release(&self, handle: ConnectionHandle) {
        let _ = self.slots.lock().remove(&handle);
    }

    /// Whether `handle` is live.
    pub fn contains(&self, handle: ConnectionHandle) -> bool {
        self.slots.lock().contains_key(&handle)
    }

    /// Number of live links.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether no link is live.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
