//! Subscription registry
//!
//! Maps each `TopicKey` to its subscriptions in registration order. The map
//! is a `DashMap`, so every mutation locks only the shard holding the topic.
//!
//! Concurrency rules:
//! - No shard guard is ever held while a subscriber runs. Publishers take a
//!   `snapshot` (a cloned `Vec` of `Arc<Subscription>`) and iterate that.
//! - Removal acts on the live list only. A snapshot taken earlier keeps the
//!   removed entry; the dispatcher re-checks `is_live` before invoking it.
//! - A topic whose list becomes empty is dropped with `remove_if`, which
//!   re-checks emptiness under the shard lock, so a concurrent `register`
//!   can never be lost.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::broker::subscription::{Subscription, SubscriptionHandle, SubscriptionId};
use crate::broker::topic::TopicKey;

/// Topic-to-subscriptions table shared by the broker and its handles.
#[derive(Debug, Default)]
pub struct Registry {
    topics: DashMap<TopicKey, Vec<Arc<Subscription>>>,
}

impl Registry {
    /// Empty registry. Handles keep a weak reference to it, so it always
    /// lives behind an `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends `subscription` to its topic, creating the topic on first use.
    /// An empty topic name is rejected with `None`.
    pub fn register(self: &Arc<Self>, subscription: Subscription) -> Option<SubscriptionHandle> {
        if subscription.topic().is_empty() {
            warn!("ignoring subscription with an empty topic");
            return None;
        }

        let subscription = Arc::new(subscription);
        self.topics
            .entry(subscription.topic().clone())
            .or_default()
            .push(subscription.clone());

        debug!(id = %subscription.id(), topic = %subscription.topic(), "registered subscription");
        Some(self.handle_for(subscription))
    }

    pub(crate) fn handle_for(
        self: &Arc<Self>,
        subscription: Arc<Subscription>,
    ) -> SubscriptionHandle {
        SubscriptionHandle::new(subscription, Arc::downgrade(self))
    }

    /// Independent copy of the topic's current list, in registration order.
    pub fn snapshot(&self, topic: &TopicKey) -> Vec<Arc<Subscription>> {
        self.topics
            .get(topic)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    /// Unsubscribes the first active subscription under `topic` owned by
    /// `owner`. Returns `false` when there is none.
    pub fn unregister<O: Any + Send + Sync>(&self, owner: &Arc<O>, topic: &TopicKey) -> bool {
        let owner = Arc::as_ptr(owner) as *const ();

        let removed = {
            let Some(mut list) = self.topics.get_mut(topic) else {
                return false;
            };
            let Some(pos) = list
                .iter()
                .position(|s| s.is_active() && s.is_owned_by(owner))
            else {
                return false;
            };
            list.remove(pos)
        };

        removed.mark_unsubscribed();
        self.drop_if_empty(topic);
        debug!(id = %removed.id(), %topic, "unregistered subscription by owner");
        true
    }

    /// Removes a single subscription by id. Used by `SubscriptionHandle`.
    pub(crate) fn remove(&self, topic: &TopicKey, id: SubscriptionId) -> bool {
        let removed = match self.topics.get_mut(topic) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|s| s.id() != id);
                list.len() != before
            }
            None => false,
        };

        if removed {
            self.drop_if_empty(topic);
        }
        removed
    }

    /// Drops one topic's subscriptions, or every topic when `topic` is `None`.
    /// Removed subscribers are marked unsubscribed but not notified.
    pub fn unregister_all(&self, topic: Option<&TopicKey>) -> usize {
        let removed: Vec<Arc<Subscription>> = match topic {
            Some(topic) => self
                .topics
                .remove(topic)
                .map(|(_, list)| list)
                .unwrap_or_default(),
            None => {
                let keys: Vec<TopicKey> = self.topics.iter().map(|e| e.key().clone()).collect();
                keys.iter()
                    .filter_map(|key| self.topics.remove(key))
                    .flat_map(|(_, list)| list)
                    .collect()
            }
        };

        for subscription in &removed {
            subscription.mark_unsubscribed();
        }
        debug!(count = removed.len(), "unregistered subscriptions");
        removed.len()
    }

    /// Sweeps unsubscribed entries and entries whose owner is gone, then
    /// drops topics left empty. Returns the number of entries removed.
    pub fn purge(&self) -> usize {
        let mut purged = 0;
        self.topics.retain(|_, list| {
            list.retain(|s| {
                if s.is_live() {
                    return true;
                }
                s.mark_unsubscribed();
                purged += 1;
                false
            });
            !list.is_empty()
        });

        if purged > 0 {
            debug!(purged, "purged dead subscriptions");
        }
        purged
    }

    pub fn subscriber_count(&self, topic: &TopicKey) -> usize {
        self.topics.get(topic).map(|list| list.len()).unwrap_or(0)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    fn drop_if_empty(&self, topic: &TopicKey) {
        self.topics.remove_if(topic, |_, list| list.is_empty());
    }
}
