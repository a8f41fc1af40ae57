//! Declarative subscription state.
//!
//! The registry is the list of topics the session wants, not a log of
//! SUBSCRIBE frames already sent. The engine replays it on every CONNECTED,
//! which is what makes reconnects invisible to callers.

use std::collections::HashMap;

use parley_core::{InboundFrame, SubscriptionId, TopicPath};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Receiver side of a subscription.
pub type FrameHandler = mpsc::Sender<InboundFrame>;

struct Entry {
    id: SubscriptionId,
    handler: FrameHandler,
    seq: u64,
}

/// Result of [`SubscriptionRegistry::subscribe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscribed {
    /// The new subscription.
    pub id: SubscriptionId,
    /// The subscription it replaced on the same topic, if any.
    pub replaced: Option<SubscriptionId>,
}

/// Result of routing one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the handler.
    Delivered,
    /// No subscription for the topic; frame dropped.
    UnknownTopic,
    /// The handler's receiver is gone.
    HandlerGone(SubscriptionId),
    /// The handler's queue is full; frame dropped.
    Backpressure(SubscriptionId),
}

/// At most one live handler per topic path.
#[derive(Default)]
pub struct SubscriptionRegistry {
    by_topic: HashMap<TopicPath, Entry>,
    topics: HashMap<SubscriptionId, TopicPath>,
    next_seq: u64,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`, replacing any existing handler.
    pub fn subscribe(&mut self, topic: TopicPath, handler: FrameHandler) -> Subscribed {
        let replaced = self.by_topic.remove(&topic).map(|old| {
            let _ = self.topics.remove(&old.id);
            old.id
        });

        let id = SubscriptionId::new();
        self.next_seq += 1;
        let _ = self.topics.insert(id.clone(), topic.clone());
        let _ = self.by_topic.insert(
            topic,
            Entry {
                id: id.clone(),
                handler,
                seq: self.next_seq,
            },
        );
        Subscribed { id, replaced }
    }

    /// Drop subscription `id`. Unknown ids are a no-op.
    pub fn unsubscribe(&mut self, id: &SubscriptionId) -> Option<TopicPath> {
        let topic = self.topics.remove(id)?;
        let _ = self.by_topic.remove(&topic);
        Some(topic)
    }

    /// Hand `frame` to the handler registered for its exact topic.
    pub fn route(&self, frame: InboundFrame) -> Delivery {
        let Some(entry) = self.by_topic.get(&frame.topic) else {
            return Delivery::UnknownTopic;
        };
        match entry.handler.try_send(frame) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Backpressure(entry.id.clone()),
            Err(TrySendError::Closed(_)) => Delivery::HandlerGone(entry.id.clone()),
        }
    }

    /// Every `(id, topic)` in registration order.
    pub fn replay(&self) -> Vec<(SubscriptionId, TopicPath)> {
        let mut entries: Vec<_> = self
            .by_topic
            .iter()
            .map(|(topic, entry)| (entry.seq, entry.id.clone(), topic.clone()))
            .collect();
        entries.sort_by_key(|(seq, _, _)| *seq);
        entries
            .into_iter()
            .map(|(_, id, topic)| (id, topic))
            .collect()
    }

    /// Registered topics in registration order.
    pub fn topics(&self) -> Vec<TopicPath> {
        self.replay().into_iter().map(|(_, topic)| topic).collect()
    }

    /// Subscription id for `topic`.
    pub fn id_for(&self, topic: &TopicPath) -> Option<&SubscriptionId> {
        self.by_topic.get(topic).map(|entry| &entry.id)
    }

    /// Whether `topic` has a live handler.
    pub fn contains(&self, topic: &TopicPath) -> bool {
        self.by_topic.contains_key(topic)
    }

    /// Number of subscriptions.
    pub fn len(&self) -> usize {
        self.by_topic.len()
    }

    /// Whether there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.by_topic.is_empty()
    }

    /// Drop every subscription and its handler.
    pub fn clear(&mut self) {
        self.by_topic.clear();
        self.topics.clear();
    }
}
