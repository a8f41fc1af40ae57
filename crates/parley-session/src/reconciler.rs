//! Optimistic echo reconciliation.
//!
//! A local send is shown at once. When the server broadcasts the same
//! message back on the room topic, the reconciler decides whether the copy
//! is an echo to suppress or a genuinely new event.
//!
//! Two policies:
//! - `SenderIdentity`: every inbound chat message authored by the local
//!   identity is an echo. Messages the same user sent from another device
//!   are dropped too.
//! - `ClientNonce`: only inbound messages carrying a nonce we sent and have
//!   not yet seen echoed are suppressed.
//!
//! Join and leave notices are never echoed locally, so they always pass.

use std::collections::VecDeque;

use parley_core::{ChatEvent, ChatEventKind, ClientNonce, OutboundEnvelope, UserId};
use parley_settings::ReconcilePolicy;
use tracing::trace;

/// Outstanding nonces remembered under `ClientNonce`.
pub const MAX_OUTSTANDING_NONCES: usize = 256;

/// Where a timeline entry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Optimistic echo of our own send.
    Local,
    /// Delivered by the server.
    Remote,
}

/// One event in a room's visible stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Display position, starting at 1 and increasing by one per entry.
    pub position: u64,
    /// Local echo or server delivery.
    pub origin: Origin,
    /// The event itself.
    pub event: ChatEvent,
}

/// Per-room reconciler.
#[derive(Debug)]
pub struct MessageReconciler {
    identity: UserId,
    policy: ReconcilePolicy,
    outstanding: VecDeque<ClientNonce>,
    next_position: u64,
    suppressed: u64,
}

impl MessageReconciler {
    /// Reconciler for the local `identity`.
    #[must_use]
    pub fn new(identity: UserId, policy: ReconcilePolicy) -> Self {
        Self {
            identity,
            policy,
            outstanding: VecDeque::new(),
            next_position: 1,
            suppressed: 0,
        }
    }

    /// Active policy.
    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    /// Remember `nonce` as awaiting its echo. Call before the send goes out
    /// so an early echo is still recognised. No-op under `SenderIdentity`.
    pub fn expect_echo(&mut self, nonce: &ClientNonce) {
        if self.policy != ReconcilePolicy::ClientNonce {
            return;
        }
        if self.outstanding.len() == MAX_OUTSTANDING_NONCES {
            let _ = self.outstanding.pop_front();
        }
        self.outstanding.push_back(nonce.clone());
    }

    /// Forget `nonce` after a rejected send.
    pub fn cancel_echo(&mut self, nonce: &ClientNonce) {
        self.outstanding.retain(|n| n != nonce);
    }

    /// Append the optimistic echo of an accepted send.
    pub fn local(&mut self, envelope: &OutboundEnvelope) -> TimelineEntry {
        self.append(Origin::Local, ChatEvent::from_envelope(envelope))
    }

    /// Reconcile a server-delivered event. `None` means it was an echo.
    pub fn remote(&mut self, event: ChatEvent) -> Option<TimelineEntry> {
        if self.is_echo(&event) {
            self.suppressed += 1;
            trace!(sender = %event.sender_id, room = %event.room_id, "suppressed echo");
            return None;
        }
        Some(self.append(Origin::Remote, event))
    }

    /// Number of suppressed echoes.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Nonces still waiting for their echo.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    fn is_echo(&mut self, event: &ChatEvent) -> bool {
        if event.kind != ChatEventKind::Chat || event.sender_id != self.identity {
            return false;
        }
        match self.policy {
            ReconcilePolicy::SenderIdentity => true,
            ReconcilePolicy::ClientNonce => {
                let Some(nonce) = event.client_nonce.as_ref() else {
                    return false;
                };
                match self.outstanding.iter().position(|n| n == nonce) {
                    Some(index) => {
                        let _ = self.outstanding.remove(index);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    fn append(&mut self, origin: Origin, event: ChatEvent) -> TimelineEntry {
        let position = self.next_position;
        self.next_position += 1;
        TimelineEntry {
            position,
            origin,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::RoomId;

    fn envelope(body: &str) -> OutboundEnvelope {
        OutboundEnvelope::new(RoomId::from("R1"), UserId::from("me"), body)
    }

    fn send(reconciler: &mut MessageReconciler, env: &OutboundEnvelope) -> TimelineEntry {
        reconciler.expect_echo(&env.client_nonce);
        reconciler.local(env)
    }

    fn inbound(sender: &str, body: &str, nonce: Option<&ClientNonce>) -> ChatEvent {
        ChatEvent {
            room_id: RoomId::from("R1"),
            sender_id: UserId::from(sender),
            body: body.to_string(),
            server_timestamp: None,
            kind: ChatEventKind::Chat,
            client_nonce: nonce.cloned(),
        }
    }

    #[test]
    fn sender_identity_suppresses_own_echo() {
        let mut reconciler = MessageReconciler::new(UserId::from("me"), ReconcilePolicy::SenderIdentity);
        let sent = envelope("hello");
        let local = send(&mut reconciler, &sent);
        assert_eq!(local.origin, Origin::Local);
        assert_eq!(local.position, 1);
        assert_eq!(local.event.body, "hello");

        assert!(reconciler.remote(inbound("me", "hello", None)).is_none());
        assert_eq!(reconciler.suppressed(), 1);
    }

    #[test]
    fn sender_identity_drops_other_device_copies() {
        let mut reconciler = MessageReconciler::new(UserId::from("me"), ReconcilePolicy::SenderIdentity);
        assert!(reconciler.remote(inbound("me", "from my phone", None)).is_none());
    }

    #[test]
    fn other_senders_are_delivered_in_order() {
        let mut reconciler = MessageReconciler::new(UserId::from("me"), ReconcilePolicy::SenderIdentity);
        let a = reconciler.remote(inbound("alice", "hi", None)).unwrap();
        let _ = send(&mut reconciler, &envelope("yo"));
        let b = reconciler.remote(inbound("bob", "hey", None)).unwrap();
        assert_eq!((a.position, b.position), (1, 3));
        assert_eq!(b.origin, Origin::Remote);
    }

    #[test]
    fn join_and_leave_pass_through() {
        let mut reconciler = MessageReconciler::new(UserId::from("me"), ReconcilePolicy::SenderIdentity);
        let mut join = inbound("me", "me joined", None);
        join.kind = ChatEventKind::Join;
        assert!(reconciler.remote(join).is_some());
    }

    #[test]
    fn nonce_policy_matches_exact_nonce_once() {
        let mut reconciler = MessageReconciler::new(UserId::from("me"), ReconcilePolicy::ClientNonce);
        let sent = envelope("hello");
        let _ = send(&mut reconciler, &sent);
        assert_eq!(reconciler.outstanding(), 1);

        assert!(reconciler.remote(inbound("me", "hello", Some(&sent.client_nonce))).is_none());
        assert_eq!(reconciler.outstanding(), 0);
        // A second copy with the same nonce is no longer outstanding.
        assert!(reconciler.remote(inbound("me", "hello", Some(&sent.client_nonce))).is_some());
    }

    #[test]
    fn nonce_policy_delivers_other_device_messages() {
        let mut reconciler = MessageReconciler::new(UserId::from("me"), ReconcilePolicy::ClientNonce);
        let _ = send(&mut reconciler, &envelope("hello"));
        let foreign = ClientNonce::new();
        assert!(reconciler.remote(inbound("me", "from my phone", Some(&foreign))).is_some());
        assert!(reconciler.remote(inbound("me", "no nonce", None)).is_some());
        assert_eq!(reconciler.suppressed(), 0);
    }

    #[test]
    fn outstanding_nonces_are_bounded() {
        let mut reconciler = MessageReconciler::new(UserId::from("me"), ReconcilePolicy::ClientNonce);
        let first = envelope("0");
        let _ = send(&mut reconciler, &first);
        for i in 1..=MAX_OUTSTANDING_NONCES {
            let _ = send(&mut reconciler, &envelope(&i.to_string()));
        }
        assert_eq!(reconciler.outstanding(), MAX_OUTSTANDING_NONCES);
        assert!(reconciler.remote(inbound("me", "0", Some(&first.client_nonce))).is_some());
    }

    #[test]
    fn echo_before_local_append_is_still_suppressed() {
        let mut reconciler = MessageReconciler::new(UserId::from("me"), ReconcilePolicy::ClientNonce);
        let sent = envelope("fast");
        reconciler.expect_echo(&sent.client_nonce);
        assert!(reconciler.remote(inbound("me", "fast", Some(&sent.client_nonce))).is_none());
        let local = reconciler.local(&sent);
        assert_eq!(local.position, 1);
    }

    #[test]
    fn cancelled_echo_is_forgotten() {
        let mut reconciler = MessageReconciler::new(UserId::from("me"), ReconcilePolicy::ClientNonce);
        let sent = envelope("rejected");
        reconciler.expect_echo(&sent.client_nonce);
        reconciler.cancel_echo(&sent.client_nonce);
        assert_eq!(reconciler.outstanding(), 0);
    }

    #[test]
    fn sender_identity_does_not_track_nonces() {
        let mut reconciler = MessageReconciler::new(UserId::from("me"), ReconcilePolicy::SenderIdentity);
        let _ = send(&mut reconciler, &envelope("a"));
        assert_eq!(reconciler.outstanding(), 0);
        assert_eq!(reconciler.policy(), ReconcilePolicy::SenderIdentity);
    }
}
