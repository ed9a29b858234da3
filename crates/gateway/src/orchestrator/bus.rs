//! In-process event bus.
//!
//! Topics are conversation ids; the distinguished topic `"*"` receives
//! every event. Each subscription owns an unbounded channel, so publish
//! never suspends and per-conversation publish order is delivery order
//! for every receiver. A subscriber that went away is pruned on the next
//! publish and never blocks the others.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use cq_domain::event::{ConversationEvent, EventEnvelope, EventFilter};

pub const WILDCARD_TOPIC: &str = "*";

pub type SubscriptionId = Uuid;

struct Subscription {
    id: SubscriptionId,
    filter: EventFilter,
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

#[derive(Default)]
struct BusInner {
    topics: HashMap<String, Vec<Subscription>>,
    /// subscription id → topic, for unsubscribe.
    index: HashMap<SubscriptionId, String>,
}

#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a conversation id or `"*"`. Dropping the receiver is
    /// enough to end the subscription; `unsubscribe` removes it eagerly.
    pub fn subscribe(
        &self,
        topic: &str,
        filter: EventFilter,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock();
        inner
            .topics
            .entry(topic.to_owned())
            .or_default()
            .push(Subscription { id, filter, tx });
        inner.index.insert(id, topic.to_owned());
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock();
        if let Some(topic) = inner.index.remove(&id) {
            if let Some(subs) = inner.topics.get_mut(&topic) {
                subs.retain(|s| s.id != id);
                if subs.is_empty() {
                    inner.topics.remove(&topic);
                }
            }
        }
    }

    /// Synchronous fan-out to the conversation topic and the wildcard.
    pub fn publish(&self, conversation_id: &str, event: ConversationEvent) {
        let envelope = EventEnvelope::now(conversation_id, event);
        let mut inner = self.inner.lock();
        let mut dead = Vec::new();
        for topic in [conversation_id, WILDCARD_TOPIC] {
            let Some(subs) = inner.topics.get(topic) else {
                continue;
            };
            for sub in subs {
                if !sub.filter.matches(&envelope) {
                    continue;
                }
                if sub.tx.send(envelope.clone()).is_err() {
                    dead.push(sub.id);
                }
            }
        }
        drop(inner);
        for id in dead {
            self.unsubscribe(id);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().index.len()
    }
}
